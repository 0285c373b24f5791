//! Metadata cache coordination.

use crate::models::meta::{
    KEY_PROJECT_STATUS, KEY_TEXT_PRESERVE_MODE, KEY_TRANSLATION_EXTRAS, truthy,
};
use crate::models::{ItemStatus, RuleType, TextPreserveMode};
use crate::session::{ProjectSession, SessionState};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Read-through cache over the `meta` table.
pub struct MetaService {
    session: Arc<ProjectSession>,
}

impl MetaService {
    /// Creates a meta service bound to `session`.
    #[must_use]
    pub const fn new(session: Arc<ProjectSession>) -> Self {
        Self { session }
    }

    /// Reloads the whole cache from the store (empty when nothing is open).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store read fails; the previous
    /// cache is kept in that case.
    pub fn refresh_cache_from_db(&self) -> Result<()> {
        let mut state = self.session.lock();
        refresh_locked(&mut state)
    }

    /// Returns the value under `key`, or `default` when it was never set.
    ///
    /// The returned value is an independent copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_meta(&self, key: &str, default: Value) -> Result<Value> {
        let mut state = self.session.lock();
        Ok(get_locked(&mut state, key)?.unwrap_or(default))
    }

    /// Writes `key` to the store, then to the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotOpen`] with no project open, or
    /// [`Error::Storage`] if the write fails. The cache is unchanged on error.
    pub fn set_meta(&self, key: &str, value: Value) -> Result<()> {
        let mut state = self.session.lock();
        set_locked(&mut state, key, value)
    }

    /// Returns the project status, [`ItemStatus::None`] when unset or unknown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_project_status(&self) -> Result<ItemStatus> {
        let raw = self.get_meta(KEY_PROJECT_STATUS, Value::Null)?;
        Ok(raw.as_str().and_then(ItemStatus::parse).unwrap_or_default())
    }

    /// Stores the project status.
    ///
    /// # Errors
    ///
    /// See [`Self::set_meta`].
    pub fn set_project_status(&self, status: ItemStatus) -> Result<()> {
        self.set_meta(KEY_PROJECT_STATUS, Value::String(status.as_str().to_string()))
    }

    /// Returns the translation counters object (empty when unset or malformed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_translation_extras(&self) -> Result<Map<String, Value>> {
        match self.get_meta(KEY_TRANSLATION_EXTRAS, Value::Null)? {
            Value::Object(extras) => Ok(extras),
            _ => Ok(Map::new()),
        }
    }

    /// Stores the translation counters object.
    ///
    /// # Errors
    ///
    /// See [`Self::set_meta`].
    pub fn set_translation_extras(&self, extras: Map<String, Value>) -> Result<()> {
        self.set_meta(KEY_TRANSLATION_EXTRAS, Value::Object(extras))
    }

    /// Returns the text preservation mode.
    ///
    /// Projects that predate the mode key only carry the `TEXT_PRESERVE`
    /// enable flag: a set flag reads as [`TextPreserveMode::Custom`], anything
    /// else as [`TextPreserveMode::Smart`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a cache miss cannot be read through.
    pub fn get_text_preserve_mode(&self) -> Result<TextPreserveMode> {
        let mut state = self.session.lock();
        let stored = get_locked(&mut state, KEY_TEXT_PRESERVE_MODE)?;
        if let Some(mode) = stored.as_ref().and_then(Value::as_str).and_then(TextPreserveMode::parse) {
            return Ok(mode);
        }

        let legacy = get_locked(&mut state, RuleType::TextPreserve.enable_key())?;
        Ok(if legacy.as_ref().is_some_and(truthy) {
            TextPreserveMode::Custom
        } else {
            TextPreserveMode::Smart
        })
    }

    /// Stores the text preservation mode.
    ///
    /// # Errors
    ///
    /// See [`Self::set_meta`].
    pub fn set_text_preserve_mode(&self, mode: TextPreserveMode) -> Result<()> {
        self.set_meta(KEY_TEXT_PRESERVE_MODE, Value::String(mode.as_str().to_string()))
    }
}

pub(crate) fn refresh_locked(state: &mut SessionState) -> Result<()> {
    let fresh = match &state.db {
        Some(db) => db.get_all_meta()?.into_iter().collect(),
        None => Default::default(),
    };
    state.meta_cache = fresh;
    Ok(())
}

pub(crate) fn get_locked(state: &mut SessionState, key: &str) -> Result<Option<Value>> {
    if let Some(value) = state.meta_cache.get(key) {
        metrics::counter!("lgstore_cache_hits_total", "tier" => "meta").increment(1);
        return Ok(Some(value.clone()));
    }
    metrics::counter!("lgstore_cache_misses_total", "tier" => "meta").increment(1);

    let Some(db) = &state.db else {
        return Ok(None);
    };
    let stored = db.get_meta(key)?;
    if let Some(value) = &stored {
        state.meta_cache.insert(key.to_string(), value.clone());
    }
    Ok(stored)
}

pub(crate) fn set_locked(state: &mut SessionState, key: &str, value: Value) -> Result<()> {
    let db = state.db.as_ref().ok_or(Error::ProjectNotOpen)?;
    db.set_meta(key, &value)?;
    state.meta_cache.insert(key.to_string(), value);
    Ok(())
}
