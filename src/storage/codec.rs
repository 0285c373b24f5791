//! Asset payload compression (zstd).
//!
//! Payloads are single zstd frames with the content size in the header,
//! which is what project files written by other tools expect. Frames
//! without a content size still decompress.

use crate::{Error, Result};

/// zstd compression level for stored assets.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Compresses an asset payload.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the encoder fails.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::bulk::compress(data, COMPRESSION_LEVEL).map_err(|e| Error::Storage {
        operation: "compress_asset".to_string(),
        cause: e.to_string(),
    })
}

/// Decompresses the payload stored under `path`.
///
/// # Errors
///
/// Returns [`Error::Decompression`] if `data` is not a valid zstd frame.
pub fn decompress(path: &str, data: &[u8]) -> Result<Vec<u8>> {
    zstd::stream::decode_all(data).map_err(|e| Error::Decompression {
        path: path.to_string(),
        cause: e.to_string(),
    })
}
