//! Per-project session state.
//!
//! One [`ProjectSession`] guards the open store handle and every cache tier
//! behind a single mutex. All services share it, so a multi-tier update
//! (a batch write, a project switch) is visible to readers all at once.
//!
//! [`std::sync::Mutex`] is not re-entrant. Services therefore acquire the
//! lock once at their public entry point and pass `&mut SessionState` to
//! internal helpers instead of calling each other's public methods.

use crate::models::{Item, RuleEntry, RuleType};
use crate::storage::{ProjectDatabase, acquire_lock};
use lru::LruCache;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of decompressed assets kept in memory.
pub const ASSET_DECOMPRESS_CACHE_MAX: usize = 32;

/// Items in id order plus an id → position index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCache {
    items: Vec<Item>,
    index: HashMap<i64, usize>,
}

impl ItemCache {
    /// Builds the cache from store rows.
    #[must_use]
    pub fn from_items(items: Vec<Item>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| item.id.map(|id| (id, pos)))
            .collect();
        Self { items, index }
    }

    /// Cached items in load order.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Looks up one item by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Item> {
        self.index.get(&id).and_then(|&pos| self.items.get(pos))
    }

    /// Number of cached items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cache holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replaces the cached copy of `item` in place.
    ///
    /// Returns `false` (and changes nothing) when the item has no id or the
    /// id is not cached.
    pub fn update(&mut self, item: &Item) -> bool {
        let Some(pos) = item.id.and_then(|id| self.index.get(&id).copied()) else {
            return false;
        };
        match self.items.get_mut(pos) {
            Some(slot) => {
                *slot = item.clone();
                true
            },
            None => false,
        }
    }

    /// Inserts or replaces `item` by id.
    pub fn upsert(&mut self, item: Item) {
        let Some(id) = item.id else {
            return;
        };
        if !self.update(&item) {
            self.index.insert(id, self.items.len());
            self.items.push(item);
        }
    }
}

/// Everything the session lock protects.
pub struct SessionState {
    /// Open store, if any.
    pub db: Option<Arc<ProjectDatabase>>,
    /// Path of the open project file.
    pub lg_path: Option<PathBuf>,
    /// Metadata values read or written this session.
    pub meta_cache: HashMap<String, Value>,
    /// Rule lists per list-shaped type.
    pub rule_cache: HashMap<RuleType, Vec<RuleEntry>>,
    /// Rule text per text-shaped type.
    pub rule_text_cache: HashMap<RuleType, String>,
    /// All items, once loaded.
    pub item_cache: Option<ItemCache>,
    /// Decompressed assets, least-recently-used evicted first.
    pub asset_cache: LruCache<String, Arc<Vec<u8>>>,
}

impl SessionState {
    fn new(asset_cache_capacity: NonZeroUsize) -> Self {
        Self {
            db: None,
            lg_path: None,
            meta_cache: HashMap::new(),
            rule_cache: HashMap::new(),
            rule_text_cache: HashMap::new(),
            item_cache: None,
            asset_cache: LruCache::new(asset_cache_capacity),
        }
    }

    /// Returns the open store, or [`crate::Error::ProjectNotOpen`].
    ///
    /// # Errors
    ///
    /// Fails when no project is open.
    pub fn require_db(&self) -> crate::Result<Arc<ProjectDatabase>> {
        self.db.clone().ok_or(crate::Error::ProjectNotOpen)
    }

    /// Empties every cache tier; the store handle and path are untouched.
    pub fn clear_caches(&mut self) {
        self.meta_cache.clear();
        self.rule_cache.clear();
        self.rule_text_cache.clear();
        self.item_cache = None;
        self.asset_cache.clear();
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("lg_path", &self.lg_path)
            .field("meta_cache", &self.meta_cache.len())
            .field("rule_cache", &self.rule_cache.len())
            .field("rule_text_cache", &self.rule_text_cache.len())
            .field("item_cache", &self.item_cache.as_ref().map(ItemCache::len))
            .field("asset_cache", &self.asset_cache.len())
            .finish_non_exhaustive()
    }
}

/// Shared handle to the session state.
#[derive(Debug)]
pub struct ProjectSession {
    state: Mutex<SessionState>,
}

impl ProjectSession {
    /// Creates an empty session with the given asset cache capacity.
    ///
    /// A capacity of zero falls back to [`ASSET_DECOMPRESS_CACHE_MAX`].
    #[must_use]
    pub fn new(asset_cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(asset_cache_capacity)
            .or_else(|| NonZeroUsize::new(ASSET_DECOMPRESS_CACHE_MAX))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(SessionState::new(capacity)),
        }
    }

    /// Acquires the session lock.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        acquire_lock(&self.state)
    }

    /// Empties every cache tier.
    pub fn clear_all_caches(&self) {
        self.lock().clear_caches();
    }
}

impl Default for ProjectSession {
    fn default() -> Self {
        Self::new(ASSET_DECOMPRESS_CACHE_MAX)
    }
}
