//! Project lifecycle and the service facade.

use super::{AssetService, BatchService, ItemService, MetaService, RuleService, meta, rule};
use crate::config::StoreConfig;
use crate::models::meta::truthy;
use crate::models::{ProjectSummary, RuleEntry, RuleType, TextPreserveMode};
use crate::services::rule_merge::{MergeMode, MergeReport, merge};
use crate::session::{ProjectSession, SessionState};
use crate::storage::ProjectDatabase;
use crate::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Owns the session and every service for one open project at a time.
///
/// Replaces a process-wide singleton: construct one and pass it by
/// reference to whatever needs project state.
pub struct ProjectManager {
    config: StoreConfig,
    session: Arc<ProjectSession>,
    meta: MetaService,
    rules: RuleService,
    items: ItemService,
    assets: AssetService,
    batch: BatchService,
}

impl ProjectManager {
    /// Creates a manager with no project open.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let session = Arc::new(ProjectSession::new(config.asset_cache_capacity));
        Self {
            meta: MetaService::new(Arc::clone(&session)),
            rules: RuleService::new(Arc::clone(&session)),
            items: ItemService::new(Arc::clone(&session)),
            assets: AssetService::new(Arc::clone(&session)),
            batch: BatchService::new(Arc::clone(&session)),
            session,
            config,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Metadata service.
    #[must_use]
    pub const fn meta(&self) -> &MetaService {
        &self.meta
    }

    /// Rule service.
    #[must_use]
    pub const fn rules(&self) -> &RuleService {
        &self.rules
    }

    /// Item service.
    #[must_use]
    pub const fn items(&self) -> &ItemService {
        &self.items
    }

    /// Asset service.
    #[must_use]
    pub const fn assets(&self) -> &AssetService {
        &self.assets
    }

    /// Batch service.
    #[must_use]
    pub const fn batch(&self) -> &BatchService {
        &self.batch
    }

    // ========== Lifecycle ==========

    /// Creates a project file at `path`, replacing any existing file, and
    /// seeds it from the configured rule presets.
    ///
    /// The new project is not opened. Returns the labels of the presets
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the old file cannot be removed or the
    /// new one cannot be written.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn create_project(&self, path: impl AsRef<Path>, name: &str) -> Result<Vec<String>> {
        let path = path.as_ref();

        if self.lg_path().as_deref() == Some(path) {
            self.close();
        }
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| Error::Storage {
                operation: "remove_project_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
            // A leftover WAL would be replayed into the new file.
            for suffix in ["-wal", "-shm"] {
                let mut sidecar = path.as_os_str().to_owned();
                sidecar.push(suffix);
                let _ = std::fs::remove_file(sidecar);
            }
            tracing::debug!(path = %path.display(), "Removed existing project file");
        }

        let db = ProjectDatabase::create(path, name)?;
        let applied = RuleService::initialize_project_rules(&db, &self.config.presets)?;

        metrics::counter!("lgstore_projects_created_total").increment(1);
        Ok(applied)
    }

    /// Opens the project at `path`, closing any open one first.
    ///
    /// Refreshes the file's access timestamp, loads the metadata cache and
    /// empties every other cache tier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist, or
    /// [`Error::Storage`] if it cannot be read. No project is open after a
    /// failure.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut state = self.session.lock();
        close_locked(&mut state);

        let db = Arc::new(ProjectDatabase::load(path)?);
        state.db = Some(db);
        if let Err(e) = meta::refresh_locked(&mut state) {
            state.db = None;
            return Err(e);
        }
        state.lg_path = Some(path.to_path_buf());

        tracing::info!(path = %path.display(), "Opened project");
        Ok(())
    }

    /// Closes the open project and empties every cache tier. No-op if
    /// nothing is open.
    pub fn close(&self) {
        let mut state = self.session.lock();
        close_locked(&mut state);
    }

    /// Whether a project is open.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        let state = self.session.lock();
        state.db.is_some() && state.lg_path.is_some()
    }

    /// Path of the open project.
    #[must_use]
    pub fn lg_path(&self) -> Option<PathBuf> {
        self.session.lock().lg_path.clone()
    }

    /// Switches the open project to a long-lived connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the connection cannot be opened.
    pub fn open_db(&self) -> Result<()> {
        let db = self.session.lock().db.clone();
        db.map_or(Ok(()), |db| db.open())
    }

    /// Releases the long-lived connection.
    pub fn close_db(&self) {
        let db = self.session.lock().db.clone();
        if let Some(db) = db {
            db.close();
        }
    }

    /// Drops the item cache; called while a translation run writes items
    /// directly.
    pub fn on_translation_activity(&self) {
        self.items.clear_item_cache();
    }

    /// Summarizes the open project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotOpen`] with no project open, or
    /// [`Error::Storage`] if the store read fails.
    pub fn get_project_summary(&self) -> Result<ProjectSummary> {
        let db = self.session.lock().require_db()?;
        db.get_project_summary()
    }

    /// Summarizes a project file without opening it or touching its
    /// timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist, or
    /// [`Error::Storage`] if it cannot be read.
    pub fn peek_project_summary(path: impl AsRef<Path>) -> Result<ProjectSummary> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("project file {}", path.display())));
        }
        ProjectDatabase::new(path).get_project_summary()
    }

    // ========== Rules ==========

    /// Glossary entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_glossary(&self) -> Result<Vec<RuleEntry>> {
        self.rules.get_rules_cached(RuleType::Glossary)
    }

    /// Replaces the glossary; `save = false` only updates the cache.
    ///
    /// # Errors
    ///
    /// See [`RuleService::set_rules_cached`].
    pub fn set_glossary(&self, rules: Vec<RuleEntry>, save: bool) -> Result<()> {
        self.rules.set_rules_cached(RuleType::Glossary, rules, save)
    }

    /// Text preserve entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_text_preserve(&self) -> Result<Vec<RuleEntry>> {
        self.rules.get_rules_cached(RuleType::TextPreserve)
    }

    /// Replaces the text preserve entries.
    ///
    /// # Errors
    ///
    /// See [`RuleService::set_rules_cached`].
    pub fn set_text_preserve(&self, rules: Vec<RuleEntry>) -> Result<()> {
        self.rules.set_rules_cached(RuleType::TextPreserve, rules, true)
    }

    /// Pre-translation replacement entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_pre_replacement(&self) -> Result<Vec<RuleEntry>> {
        self.rules.get_rules_cached(RuleType::PreReplacement)
    }

    /// Replaces the pre-translation replacement entries.
    ///
    /// # Errors
    ///
    /// See [`RuleService::set_rules_cached`].
    pub fn set_pre_replacement(&self, rules: Vec<RuleEntry>) -> Result<()> {
        self.rules.set_rules_cached(RuleType::PreReplacement, rules, true)
    }

    /// Post-translation replacement entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_post_replacement(&self) -> Result<Vec<RuleEntry>> {
        self.rules.get_rules_cached(RuleType::PostReplacement)
    }

    /// Replaces the post-translation replacement entries.
    ///
    /// # Errors
    ///
    /// See [`RuleService::set_rules_cached`].
    pub fn set_post_replacement(&self, rules: Vec<RuleEntry>) -> Result<()> {
        self.rules.set_rules_cached(RuleType::PostReplacement, rules, true)
    }

    /// Chinese custom prompt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_custom_prompt_zh(&self) -> Result<String> {
        self.rules.get_rule_text_cached(RuleType::CustomPromptZh)
    }

    /// Replaces the Chinese custom prompt.
    ///
    /// # Errors
    ///
    /// See [`RuleService::set_rule_text_cached`].
    pub fn set_custom_prompt_zh(&self, text: &str) -> Result<()> {
        self.rules.set_rule_text_cached(RuleType::CustomPromptZh, text)
    }

    /// English custom prompt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_custom_prompt_en(&self) -> Result<String> {
        self.rules.get_rule_text_cached(RuleType::CustomPromptEn)
    }

    /// Replaces the English custom prompt.
    ///
    /// # Errors
    ///
    /// See [`RuleService::set_rule_text_cached`].
    pub fn set_custom_prompt_en(&self, text: &str) -> Result<()> {
        self.rules.set_rule_text_cached(RuleType::CustomPromptEn, text)
    }

    /// Whether `rule_type` is enabled for the open project.
    ///
    /// List-shaped types default to enabled, custom prompts to disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn is_rule_enabled(&self, rule_type: RuleType) -> Result<bool> {
        let value = self
            .meta
            .get_meta(rule_type.enable_key(), Value::Bool(rule_type.default_enabled()))?;
        Ok(truthy(&value))
    }

    /// Enables or disables `rule_type`.
    ///
    /// # Errors
    ///
    /// See [`MetaService::set_meta`].
    pub fn set_rule_enabled(&self, rule_type: RuleType, enabled: bool) -> Result<()> {
        self.meta.set_meta(rule_type.enable_key(), Value::Bool(enabled))
    }

    /// Text preservation mode of the open project.
    ///
    /// # Errors
    ///
    /// See [`MetaService::get_text_preserve_mode`].
    pub fn get_text_preserve_mode(&self) -> Result<TextPreserveMode> {
        self.meta.get_text_preserve_mode()
    }

    /// Sets the text preservation mode.
    ///
    /// # Errors
    ///
    /// See [`MetaService::set_meta`].
    pub fn set_text_preserve_mode(&self, mode: TextPreserveMode) -> Result<()> {
        self.meta.set_text_preserve_mode(mode)
    }

    /// Merges `incoming` into the stored entries of `rule_type` and saves
    /// the result.
    ///
    /// Read, merge and write happen under one session lock acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for text-shaped types,
    /// [`Error::ProjectNotOpen`] with no project open, or
    /// [`Error::Storage`] if the store fails.
    pub fn merge_rules(
        &self,
        rule_type: RuleType,
        incoming: &[RuleEntry],
        mode: MergeMode,
    ) -> Result<MergeReport> {
        let mut state = self.session.lock();
        state.require_db()?;

        let existing = rule::get_rules_locked(&mut state, rule_type)?;
        let (merged, report) = merge(rule_type, &existing, incoming, mode)?;
        rule::set_rules_locked(&mut state, rule_type, merged, true)?;

        if !report.conflicts.is_empty() {
            tracing::info!(
                rule_type = %rule_type,
                conflicts = report.conflicts.len(),
                "Rule merge resolved conflicts"
            );
        }
        Ok(report)
    }
}

fn close_locked(state: &mut SessionState) {
    if let Some(db) = state.db.take() {
        db.close();
        tracing::info!(path = %db.db_path().display(), "Closed project");
    }
    state.lg_path = None;
    state.clear_caches();
}

impl std::fmt::Debug for ProjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectManager")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
