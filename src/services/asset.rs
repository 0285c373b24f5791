//! Asset access and the decompressed-asset cache.

use crate::session::ProjectSession;
use crate::storage::codec;
use crate::{Error, Result};
use std::sync::Arc;

/// Access to stored source files.
///
/// Decompression runs outside the session lock; the result is only cached
/// if the same project is still open when it finishes.
pub struct AssetService {
    session: Arc<ProjectSession>,
}

impl AssetService {
    /// Creates an asset service bound to `session`.
    #[must_use]
    pub const fn new(session: Arc<ProjectSession>) -> Self {
        Self { session }
    }

    /// Returns every asset path, sorted (empty with no project).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store read fails.
    pub fn get_all_asset_paths(&self) -> Result<Vec<String>> {
        let db = self.session.lock().db.clone();
        db.map_or_else(|| Ok(Vec::new()), |db| db.get_all_asset_paths())
    }

    /// Returns the compressed payload at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store read fails.
    pub fn get_asset(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let db = self.session.lock().db.clone();
        db.map_or(Ok(None), |db| db.get_asset(path))
    }

    /// Returns the decompressed payload at `path`, served from the LRU cache
    /// when possible.
    ///
    /// A payload that fails to decompress is logged and reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store read fails.
    pub fn get_asset_decompressed(&self, path: &str) -> Result<Option<Arc<Vec<u8>>>> {
        let db = {
            let mut state = self.session.lock();
            if let Some(data) = state.asset_cache.get(path) {
                metrics::counter!("lgstore_cache_hits_total", "tier" => "assets").increment(1);
                return Ok(Some(Arc::clone(data)));
            }
            match &state.db {
                Some(db) => Arc::clone(db),
                None => return Ok(None),
            }
        };
        metrics::counter!("lgstore_cache_misses_total", "tier" => "assets").increment(1);

        let Some(compressed) = db.get_asset(path)? else {
            return Ok(None);
        };

        let data = match codec::decompress(path, &compressed) {
            Ok(data) => Arc::new(data),
            Err(e) => {
                tracing::error!(error = %e, "Failed to decompress asset");
                return Ok(None);
            },
        };

        let mut state = self.session.lock();
        if state.db.as_ref().is_some_and(|current| Arc::ptr_eq(current, &db)) {
            state.asset_cache.put(path.to_string(), Arc::clone(&data));
        }
        Ok(Some(data))
    }

    /// Compresses and stores a new asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotOpen`] with no project open,
    /// [`Error::InvalidInput`] if `path` is already stored, or
    /// [`Error::Storage`] if compression or the write fails.
    pub fn add_asset(&self, path: &str, data: &[u8]) -> Result<i64> {
        let compressed = codec::compress(data)?;

        let mut state = self.session.lock();
        let db = state.require_db()?;
        if db.has_asset(path)? {
            return Err(Error::InvalidInput(format!("asset already exists: {path}")));
        }

        let id = db.add_asset(path, &compressed, data.len() as u64)?;
        state.asset_cache.pop(path);
        tracing::debug!(
            path,
            original_size = data.len(),
            compressed_size = compressed.len(),
            "Added asset"
        );
        Ok(id)
    }

    /// Empties the decompressed-asset cache.
    pub fn clear_decompress_cache(&self) {
        self.session.lock().asset_cache.clear();
    }
}
