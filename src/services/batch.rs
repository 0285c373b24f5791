//! Multi-family transactional writes.

use super::item::update_cache_locked;
use crate::models::BatchUpdate;
use crate::session::ProjectSession;
use crate::Result;
use std::sync::Arc;
use tracing::instrument;

/// Applies a [`BatchUpdate`] to the store and every affected cache tier.
pub struct BatchService {
    session: Arc<ProjectSession>,
}

impl BatchService {
    /// Creates a batch service bound to `session`.
    #[must_use]
    pub const fn new(session: Arc<ProjectSession>) -> Self {
        Self { session }
    }

    /// Writes `batch` in one transaction, then syncs the caches.
    ///
    /// The whole operation holds the session lock, so readers see either
    /// none or all of the cache changes. Caches are only touched after the
    /// commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ProjectNotOpen`] with no project open (nothing
    /// is written), or [`crate::Error::Storage`] if the transaction fails.
    #[instrument(
        skip(self, batch),
        fields(items = batch.items.len(), rules = batch.rules.len(), meta = batch.meta.len())
    )]
    pub fn update_batch(&self, batch: BatchUpdate) -> Result<()> {
        let mut state = self.session.lock();
        let db = state.require_db()?;

        db.update_batch(&batch)?;

        let BatchUpdate { items, rules, meta } = batch;
        state.meta_cache.extend(meta);
        for (rule_type, entries) in rules {
            state.rule_text_cache.remove(&rule_type);
            state.rule_cache.insert(rule_type, entries);
        }
        update_cache_locked(&mut state, &items);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::{Item, RuleEntry, RuleType};
    use crate::session::ItemCache;
    use crate::storage::ProjectDatabase;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_session() -> (TempDir, Arc<ProjectSession>, BatchService) {
        let dir = TempDir::new().unwrap();
        let db = ProjectDatabase::create(dir.path().join("p.lg"), "p").unwrap();
        let session = Arc::new(ProjectSession::default());
        session.lock().db = Some(Arc::new(db));
        let service = BatchService::new(Arc::clone(&session));
        (dir, session, service)
    }

    #[test]
    fn test_without_project_writes_nothing() {
        let service = BatchService::new(Arc::new(ProjectSession::default()));
        let batch = BatchUpdate::new().with_meta("k", json!(1));
        assert!(matches!(service.update_batch(batch), Err(Error::ProjectNotOpen)));
    }

    #[test]
    fn test_syncs_every_tier() {
        let (_dir, session, service) = open_session();
        let db = session.lock().require_db().unwrap();
        let ids = db.set_items(&[Item::new("a"), Item::new("b")]).unwrap();
        let loaded = db.get_all_items().unwrap();
        {
            let mut state = session.lock();
            state.item_cache = Some(ItemCache::from_items(loaded));
            state
                .rule_text_cache
                .insert(RuleType::Glossary, "stale".to_string());
        }

        let mut changed = Item::new("A");
        changed.id = Some(ids[0]);
        let mut unknown = Item::new("ghost");
        unknown.id = Some(ids[1] + 100);

        let batch = BatchUpdate::new()
            .with_items(vec![changed, unknown])
            .with_rules(RuleType::Glossary, vec![RuleEntry::new("HP", "生命值")])
            .with_meta("k", json!("v"));
        service.update_batch(batch).unwrap();

        let state = session.lock();
        assert_eq!(state.meta_cache.get("k"), Some(&json!("v")));
        assert_eq!(state.rule_cache[&RuleType::Glossary].len(), 1);
        assert!(!state.rule_text_cache.contains_key(&RuleType::Glossary));

        let cache = state.item_cache.as_ref().unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(ids[0]).unwrap().src, "A");

        assert_eq!(db.get_item(ids[0]).unwrap().unwrap().src, "A");
        assert_eq!(db.get_meta("k").unwrap(), Some(json!("v")));
    }

    #[test]
    fn test_failed_commit_leaves_caches_untouched() {
        let (dir, session, service) = open_session();
        let db = session.lock().require_db().unwrap();
        let ids = db.set_items(&[Item::new("a"), Item::new("b")]).unwrap();
        {
            let mut state = session.lock();
            state.item_cache = Some(ItemCache::from_items(db.get_all_items().unwrap()));
            state
                .rule_cache
                .insert(RuleType::Glossary, vec![RuleEntry::new("MP", "魔力")]);
            state
                .rule_text_cache
                .insert(RuleType::CustomPromptZh, "保持语气".to_string());
            state.meta_cache.insert("k".to_string(), json!("old"));
            state.asset_cache.put("a.txt".to_string(), Arc::new(b"asset".to_vec()));
        }
        rusqlite::Connection::open(dir.path().join("p.lg"))
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_meta BEFORE INSERT ON meta
                 BEGIN SELECT RAISE(ABORT, 'meta is read-only'); END;",
            )
            .unwrap();

        let snapshot = |session: &ProjectSession| {
            let state = session.lock();
            let assets: Vec<(String, Vec<u8>)> = state
                .asset_cache
                .iter()
                .map(|(path, data)| (path.clone(), data.to_vec()))
                .collect();
            (
                state.meta_cache.clone(),
                state.rule_cache.clone(),
                state.rule_text_cache.clone(),
                state.item_cache.clone(),
                assets,
            )
        };
        let before = snapshot(session.as_ref());

        let mut changed = Item::new("A");
        changed.id = Some(ids[0]);
        let batch = BatchUpdate::new()
            .with_items(vec![changed])
            .with_rules(RuleType::Glossary, vec![RuleEntry::new("HP", "HP")])
            .with_rules(RuleType::CustomPromptZh, Vec::new())
            .with_meta("k", json!("new"))
            .with_meta("fresh", json!(1));

        assert!(matches!(service.update_batch(batch), Err(Error::Storage { .. })));

        assert_eq!(snapshot(session.as_ref()), before);
        assert_eq!(db.get_item(ids[0]).unwrap().unwrap().src, "a");
        assert!(db.get_rules(RuleType::Glossary).unwrap().is_empty());
    }
}
