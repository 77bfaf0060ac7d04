//! Persistent per-device state cache (§4.4 step 2, §6, §11.4).
//!
//! Holds a serialized `(protocol_state, rpc_list)` pair — in this crate,
//! both live together in [`tio_core::MetadataCache`], which already bundles
//! timebases/sources/stream alongside the RPC table, so there's no separate
//! `RpcTable` to serialize.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tio_core::MetadataCache;
use tracing::warn;

use crate::error::SessionError;

/// Cache subdirectory name, generalized from `tio_session.py`'s
/// `com.twinleaf.tio.python.cache` to this crate's own reversed-domain
/// identifier (§11.4).
const CACHE_DIR_NAME: &str = "com.twinleaf.tio.rust.cache";

/// On-disk format tag. Bumped whenever [`CacheFile`]'s shape changes, so a
/// stale or foreign file fails closed (cache miss) instead of deserializing
/// garbage — an addition beyond the source's file-existence-only validity
/// check, not a guess at the open question of what *should* invalidate a
/// cache entry (§9, §11.4).
const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    metadata: MetadataCache,
}

/// The on-disk path for `device_description`'s cache entry: the description
/// string with `/` replaced by `-`, inside a well-known temp subdirectory.
#[must_use]
pub fn cache_path(device_description: &str) -> PathBuf {
    let filename = device_description.replace('/', "-");
    std::env::temp_dir().join(CACHE_DIR_NAME).join(filename)
}

/// Load a previously-cached metadata set for `device_description`.
///
/// Returns `None` on any miss — file absent, unreadable, or a version tag
/// that doesn't match [`CACHE_FORMAT_VERSION`] — rather than an error; a
/// cache miss just means cold enumeration runs, which is always correct.
#[must_use]
pub fn load(device_description: &str) -> Option<MetadataCache> {
    load_from(&cache_path(device_description))
}

fn load_from(path: &Path) -> Option<MetadataCache> {
    let bytes = std::fs::read(path).ok()?;
    let file: CacheFile = match bincode::deserialize(&bytes) {
        Ok(file) => file,
        Err(err) => {
            warn!(error = %err, path = %path.display(), "state cache unreadable, treating as a miss");
            return None;
        },
    };
    if file.version != CACHE_FORMAT_VERSION {
        warn!(
            found = file.version,
            expected = CACHE_FORMAT_VERSION,
            "state cache format version mismatch, treating as a miss"
        );
        return None;
    }
    Some(file.metadata)
}

/// Persist `metadata` for `device_description`, creating the cache
/// directory if needed.
///
/// # Errors
///
/// [`SessionError::Cache`] if the directory can't be created or the file
/// can't be written.
pub fn save(device_description: &str, metadata: &MetadataCache) -> Result<(), SessionError> {
    let path = cache_path(device_description);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| SessionError::Cache(err.to_string()))?;
    }
    let file = CacheFile { version: CACHE_FORMAT_VERSION, metadata: metadata.clone() };
    let bytes = bincode::serialize(&file).map_err(|err| SessionError::Cache(err.to_string()))?;
    std::fs::write(&path, bytes).map_err(|err| SessionError::Cache(err.to_string()))
}
