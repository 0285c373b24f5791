//! Quality rule cache coordination.
//!
//! List-shaped rule types live in `rule_cache`, text-shaped ones in
//! `rule_text_cache`. A type is only ever cached in one of the two: every
//! write evicts the sibling entry for the same type.

use crate::config::PresetConfig;
use crate::io::load_rules_from_file;
use crate::models::meta::KEY_TEXT_PRESERVE_MODE;
use crate::models::{RuleEntry, RuleType, TextPreserveMode};
use crate::session::{ProjectSession, SessionState};
use crate::storage::ProjectDatabase;
use crate::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Read-through cache over the `rules` table.
pub struct RuleService {
    session: Arc<ProjectSession>,
}

impl RuleService {
    /// Creates a rule service bound to `session`.
    #[must_use]
    pub const fn new(session: Arc<ProjectSession>) -> Self {
        Self { session }
    }

    /// Returns a copy of the entries for `rule_type` (empty with no project).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_rules_cached(&self, rule_type: RuleType) -> Result<Vec<RuleEntry>> {
        let mut state = self.session.lock();
        get_rules_locked(&mut state, rule_type)
    }

    /// Replaces the entries for `rule_type`.
    ///
    /// With `save` the store is written first; without it only the cache
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotOpen`] when saving with no project open, or
    /// [`Error::Storage`] if the write fails. The cache is unchanged on error.
    pub fn set_rules_cached(
        &self,
        rule_type: RuleType,
        rules: Vec<RuleEntry>,
        save: bool,
    ) -> Result<()> {
        let mut state = self.session.lock();
        set_rules_locked(&mut state, rule_type, rules, save)
    }

    /// Returns the text for `rule_type` (empty with no project).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_rule_text_cached(&self, rule_type: RuleType) -> Result<String> {
        let mut state = self.session.lock();
        if let Some(text) = state.rule_text_cache.get(&rule_type) {
            metrics::counter!("lgstore_cache_hits_total", "tier" => "rule_text").increment(1);
            return Ok(text.clone());
        }
        metrics::counter!("lgstore_cache_misses_total", "tier" => "rule_text").increment(1);

        let Some(db) = &state.db else {
            return Ok(String::new());
        };
        let text = db.get_rule_text(rule_type)?;
        state.rule_text_cache.insert(rule_type, text.clone());
        Ok(text)
    }

    /// Replaces the text for `rule_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotOpen`] with no project open, or
    /// [`Error::Storage`] if the write fails.
    pub fn set_rule_text_cached(&self, rule_type: RuleType, text: &str) -> Result<()> {
        let mut state = self.session.lock();
        let db = state.require_db()?;
        db.set_rule_text(rule_type, text)?;

        state.rule_text_cache.insert(rule_type, text.to_string());
        state.rule_cache.remove(&rule_type);
        Ok(())
    }

    /// Seeds a freshly created project from the configured preset files.
    ///
    /// Always writes `text_preserve_mode = "smart"` and disables the legacy
    /// `text_preserve_enable` flag. Each preset that loads is stored and, for
    /// every type but text preserve, its enable flag is set. Missing or
    /// unreadable presets are logged and skipped.
    ///
    /// Returns the labels of the presets that were applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if writing to `db` fails.
    #[instrument(skip(db, presets), fields(path = %db.db_path().display()))]
    pub fn initialize_project_rules(
        db: &ProjectDatabase,
        presets: &PresetConfig,
    ) -> Result<Vec<String>> {
        db.set_meta(
            KEY_TEXT_PRESERVE_MODE,
            &Value::String(TextPreserveMode::Smart.as_str().to_string()),
        )?;
        db.set_meta(RuleType::TextPreserve.enable_key(), &Value::Bool(false))?;

        let mut applied = Vec::new();
        for &rule_type in RuleType::all() {
            let Some(path) = presets.path_for(rule_type) else {
                continue;
            };
            if !path.exists() {
                tracing::warn!(rule_type = %rule_type, path = %path.display(), "Rule preset not found");
                continue;
            }

            if rule_type.is_text() {
                let Some(text) = read_prompt_preset(path) else {
                    continue;
                };
                db.set_rule_text(rule_type, &text)?;
            } else {
                let rules = match load_rules_from_file(path) {
                    Ok(rules) => rules,
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Failed to load preset");
                        continue;
                    },
                };
                db.set_rules(rule_type, &rules)?;
            }

            if rule_type != RuleType::TextPreserve {
                db.set_meta(rule_type.enable_key(), &Value::Bool(true))?;
            }
            tracing::info!(rule_type = %rule_type, path = %path.display(), "Applied rule preset");
            applied.push(rule_type.label().to_string());
        }

        Ok(applied)
    }
}

fn read_prompt_preset(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
            Some(text.trim().to_string())
        },
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to load prompt preset");
            None
        },
    }
}

pub(crate) fn get_rules_locked(
    state: &mut SessionState,
    rule_type: RuleType,
) -> Result<Vec<RuleEntry>> {
    if let Some(rules) = state.rule_cache.get(&rule_type) {
        metrics::counter!("lgstore_cache_hits_total", "tier" => "rules").increment(1);
        return Ok(rules.clone());
    }
    metrics::counter!("lgstore_cache_misses_total", "tier" => "rules").increment(1);

    let Some(db) = &state.db else {
        return Ok(Vec::new());
    };
    let rules = db.get_rules(rule_type)?;
    state.rule_cache.insert(rule_type, rules.clone());
    Ok(rules)
}

pub(crate) fn set_rules_locked(
    state: &mut SessionState,
    rule_type: RuleType,
    rules: Vec<RuleEntry>,
    save: bool,
) -> Result<()> {
    if save {
        let db = state.db.as_ref().ok_or(Error::ProjectNotOpen)?;
        db.set_rules(rule_type, &rules)?;
    }

    state.rule_cache.insert(rule_type, rules);
    state.rule_text_cache.remove(&rule_type);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_session() -> (TempDir, Arc<ProjectSession>, RuleService) {
        let dir = TempDir::new().unwrap();
        let db = ProjectDatabase::create(dir.path().join("p.lg"), "p").unwrap();
        let session = Arc::new(ProjectSession::default());
        session.lock().db = Some(Arc::new(db));
        let service = RuleService::new(Arc::clone(&session));
        (dir, session, service)
    }

    #[test]
    fn test_without_project() {
        let service = RuleService::new(Arc::new(ProjectSession::default()));
        assert!(service.get_rules_cached(RuleType::Glossary).unwrap().is_empty());
        assert_eq!(service.get_rule_text_cached(RuleType::CustomPromptZh).unwrap(), "");
        assert!(matches!(
            service.set_rules_cached(RuleType::Glossary, vec![], true),
            Err(Error::ProjectNotOpen)
        ));
        service
            .set_rules_cached(RuleType::Glossary, vec![RuleEntry::new("a", "b")], false)
            .unwrap();
        assert_eq!(service.get_rules_cached(RuleType::Glossary).unwrap().len(), 1);
    }

    #[test]
    fn test_set_then_get_persists() {
        let (_dir, session, service) = open_session();
        let rules = vec![RuleEntry::new("HP", "生命值")];
        service
            .set_rules_cached(RuleType::Glossary, rules.clone(), true)
            .unwrap();

        session.clear_all_caches();
        assert_eq!(service.get_rules_cached(RuleType::Glossary).unwrap(), rules);
    }

    #[test]
    fn test_unsaved_write_stays_in_cache_only() {
        let (_dir, session, service) = open_session();
        service
            .set_rules_cached(RuleType::PreReplacement, vec![RuleEntry::new("a", "b")], false)
            .unwrap();

        let db = session.lock().require_db().unwrap();
        assert!(db.get_rules(RuleType::PreReplacement).unwrap().is_empty());
    }

    #[test]
    fn test_writes_evict_sibling_tier() {
        let (_dir, session, service) = open_session();
        let rule_type = RuleType::CustomPromptEn;

        service.set_rule_text_cached(rule_type, "be terse").unwrap();
        service.set_rules_cached(rule_type, vec![], false).unwrap();
        assert!(!session.lock().rule_text_cache.contains_key(&rule_type));

        service.set_rule_text_cached(rule_type, "be formal").unwrap();
        assert!(!session.lock().rule_cache.contains_key(&rule_type));
        assert_eq!(service.get_rule_text_cached(rule_type).unwrap(), "be formal");
    }

    #[test]
    fn test_initialize_project_rules() {
        let dir = TempDir::new().unwrap();
        let glossary = dir.path().join("glossary.json");
        std::fs::write(&glossary, r#"[{"src": "HP", "dst": "生命值"}]"#).unwrap();
        let preserve = dir.path().join("preserve.json");
        std::fs::write(&preserve, r#"[{"src": "<[^>]+>"}]"#).unwrap();
        let prompt = dir.path().join("prompt.txt");
        std::fs::write(&prompt, "\u{feff}  Keep honorifics.\n").unwrap();

        let presets = PresetConfig::default()
            .with_preset(RuleType::Glossary, &glossary)
            .with_preset(RuleType::TextPreserve, &preserve)
            .with_preset(RuleType::PreReplacement, dir.path().join("missing.json"))
            .with_preset(RuleType::CustomPromptZh, &prompt);

        let db = ProjectDatabase::create(dir.path().join("p.lg"), "p").unwrap();
        let applied = RuleService::initialize_project_rules(&db, &presets).unwrap();

        assert_eq!(applied, vec!["Glossary", "Text Preserve", "Custom Prompt (ZH)"]);
        assert_eq!(db.get_rules(RuleType::Glossary).unwrap().len(), 1);
        assert_eq!(db.get_rule_text(RuleType::CustomPromptZh).unwrap(), "Keep honorifics.");
        assert_eq!(db.get_meta("glossary_enable").unwrap(), Some(json!(true)));
        assert_eq!(db.get_meta("custom_prompt_zh_enable").unwrap(), Some(json!(true)));
        assert_eq!(db.get_meta("text_preserve_enable").unwrap(), Some(json!(false)));
        assert_eq!(db.get_meta("text_preserve_mode").unwrap(), Some(json!("smart")));
        assert_eq!(db.get_meta("pre_translation_replacement_enable").unwrap(), None);
    }

    #[test]
    fn test_initialize_skips_missing_preset() {
        let dir = TempDir::new().unwrap();
        let presets = PresetConfig::default()
            .with_preset(RuleType::Glossary, dir.path().join("gone.json"))
            .with_preset(RuleType::CustomPromptEn, dir.path().join("gone.txt"));

        let db = ProjectDatabase::create(dir.path().join("p.lg"), "p").unwrap();
        let applied = RuleService::initialize_project_rules(&db, &presets).unwrap();

        assert!(applied.is_empty());
        assert!(db.get_rules(RuleType::Glossary).unwrap().is_empty());
        assert_eq!(db.get_meta("glossary_enable").unwrap(), None);
        assert_eq!(db.get_meta("custom_prompt_en_enable").unwrap(), None);
        assert_eq!(db.get_meta("text_preserve_mode").unwrap(), Some(json!("smart")));
    }

    #[test]
    fn test_initialize_skips_malformed_preset() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "[{").unwrap();

        let presets = PresetConfig::default().with_preset(RuleType::Glossary, &broken);
        let db = ProjectDatabase::create(dir.path().join("p.lg"), "p").unwrap();

        assert!(RuleService::initialize_project_rules(&db, &presets).unwrap().is_empty());
        assert!(db.get_rules(RuleType::Glossary).unwrap().is_empty());
    }
}
