//! Item cache coordination.

use crate::models::Item;
use crate::session::{ItemCache, ProjectSession, SessionState};
use crate::Result;
use std::sync::Arc;
use tracing::instrument;

/// Lazily loaded cache over the `items` table.
pub struct ItemService {
    session: Arc<ProjectSession>,
}

impl ItemService {
    /// Creates an item service bound to `session`.
    #[must_use]
    pub const fn new(session: Arc<ProjectSession>) -> Self {
        Self { session }
    }

    /// Loads every item into the cache unless it is already loaded.
    ///
    /// The store read happens under the session lock, so concurrent callers
    /// load at most once. With no project open nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the store read fails.
    pub fn load_item_cache_if_needed(&self) -> Result<()> {
        let mut state = self.session.lock();
        load_locked(&mut state)
    }

    /// Returns owned copies of every item in id order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the cache has to be loaded and
    /// the store read fails.
    pub fn get_all_items(&self) -> Result<Vec<Item>> {
        let mut state = self.session.lock();
        load_locked(&mut state)?;
        Ok(state
            .item_cache
            .as_ref()
            .map(|cache| cache.items().to_vec())
            .unwrap_or_default())
    }

    /// Returns a copy of one item.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the cache has to be loaded and
    /// the store read fails.
    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let mut state = self.session.lock();
        load_locked(&mut state)?;
        Ok(state
            .item_cache
            .as_ref()
            .and_then(|cache| cache.get(id))
            .cloned())
    }

    /// Writes one item and stores the assigned id back into it.
    ///
    /// A loaded cache is updated in place, or appended to for a new id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ProjectNotOpen`] with no project open, or
    /// [`crate::Error::Storage`] if the write fails.
    pub fn save_item(&self, item: &mut Item) -> Result<i64> {
        let mut state = self.session.lock();
        let db = state.require_db()?;

        let id = db.set_item(item)?;
        item.id = Some(id);

        if let Some(cache) = state.item_cache.as_mut() {
            cache.upsert(item.clone());
        }
        Ok(id)
    }

    /// Replaces every item and writes the new ids back in input order.
    ///
    /// Ids are reassigned on every call; the cache is rebuilt from `items`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ProjectNotOpen`] with no project open, or
    /// [`crate::Error::Storage`] if the write fails. Neither the items nor
    /// the cache change on error.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub fn replace_all_items(&self, items: &mut [Item]) -> Result<Vec<i64>> {
        let mut state = self.session.lock();
        let db = state.require_db()?;

        let ids = db.set_items(items)?;
        for (item, id) in items.iter_mut().zip(&ids) {
            item.id = Some(*id);
        }

        state.item_cache = Some(ItemCache::from_items(items.to_vec()));
        tracing::debug!(count = ids.len(), "Replaced all items");
        Ok(ids)
    }

    /// Drops the item cache; the next read reloads it.
    pub fn clear_item_cache(&self) {
        self.session.lock().item_cache = None;
    }

    /// Refreshes cached copies of `items` whose ids are already cached.
    ///
    /// Does nothing when the cache is not loaded.
    pub fn update_item_cache_by_items(&self, items: &[Item]) {
        let mut state = self.session.lock();
        update_cache_locked(&mut state, items);
    }
}

fn load_locked(state: &mut SessionState) -> Result<()> {
    if state.item_cache.is_some() {
        metrics::counter!("lgstore_cache_hits_total", "tier" => "items").increment(1);
        return Ok(());
    }
    let Some(db) = &state.db else {
        return Ok(());
    };
    metrics::counter!("lgstore_cache_misses_total", "tier" => "items").increment(1);

    let items = db.get_all_items()?;
    tracing::debug!(count = items.len(), "Loaded item cache");
    state.item_cache = Some(ItemCache::from_items(items));
    Ok(())
}

pub(crate) fn update_cache_locked(state: &mut SessionState, items: &[Item]) {
    let Some(cache) = state.item_cache.as_mut() else {
        return;
    };
    for item in items {
        cache.update(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::ItemStatus;
    use crate::storage::ProjectDatabase;
    use tempfile::TempDir;

    fn open_session() -> (TempDir, Arc<ProjectSession>, ItemService) {
        let dir = TempDir::new().unwrap();
        let db = ProjectDatabase::create(dir.path().join("p.lg"), "p").unwrap();
        let session = Arc::new(ProjectSession::default());
        session.lock().db = Some(Arc::new(db));
        let service = ItemService::new(Arc::clone(&session));
        (dir, session, service)
    }

    #[test]
    fn test_without_project() {
        let service = ItemService::new(Arc::new(ProjectSession::default()));
        assert!(service.get_all_items().unwrap().is_empty());
        assert!(matches!(
            service.save_item(&mut Item::new("x")),
            Err(Error::ProjectNotOpen)
        ));
        assert!(matches!(
            service.replace_all_items(&mut [Item::new("x")]),
            Err(Error::ProjectNotOpen)
        ));
    }

    #[test]
    fn test_replace_all_writes_ids_back() {
        let (_dir, _session, service) = open_session();
        let mut items = vec![Item::new("a"), Item::new("b")];

        let ids = service.replace_all_items(&mut items).unwrap();
        assert_eq!(items[0].id, Some(ids[0]));
        assert_eq!(items[1].id, Some(ids[1]));

        let loaded = service.get_all_items().unwrap();
        assert_eq!(loaded, items);
    }

    #[test]
    fn test_returned_items_are_copies() {
        let (_dir, _session, service) = open_session();
        service.replace_all_items(&mut [Item::new("a")]).unwrap();

        let mut items = service.get_all_items().unwrap();
        items[0].src = "mutated".to_string();

        assert_eq!(service.get_all_items().unwrap()[0].src, "a");
    }

    #[test]
    fn test_save_item_updates_loaded_cache() {
        let (_dir, _session, service) = open_session();
        service.replace_all_items(&mut [Item::new("a")]).unwrap();

        let mut fresh = Item::new("b");
        let id = service.save_item(&mut fresh).unwrap();
        assert_eq!(fresh.id, Some(id));

        let mut edited = service.get_item(id).unwrap().unwrap();
        edited.status = ItemStatus::Processed;
        service.save_item(&mut edited).unwrap();

        let items = service.get_all_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].status, ItemStatus::Processed);
    }

    #[test]
    fn test_clear_then_reload_from_store() {
        let (_dir, session, service) = open_session();
        service.replace_all_items(&mut [Item::new("a")]).unwrap();
        service.clear_item_cache();
        assert!(session.lock().item_cache.is_none());

        let db = session.lock().require_db().unwrap();
        db.set_item(&Item::new("written elsewhere")).unwrap();

        assert_eq!(service.get_all_items().unwrap().len(), 2);
    }

    #[test]
    fn test_update_by_items_ignores_unknown_ids() {
        let (_dir, _session, service) = open_session();
        let mut items = vec![Item::new("a")];
        service.replace_all_items(&mut items).unwrap();

        let mut known = items[0].clone();
        known.dst = "A".to_string();
        let mut unknown = Item::new("z");
        unknown.id = Some(999);

        service.update_item_cache_by_items(&[known, unknown]);

        let cached = service.get_all_items().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].dst, "A");
    }
}
