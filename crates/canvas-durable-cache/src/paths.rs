//! Path utilities for the sharded filesystem layout.
//!
//! ```text
//! <root>/schema.json
//! <root>/<collection>/<aa>/<sha256(id)>.json
//! <root>/<collection>/<aa>/<sha256(id)>.bin
//! ```

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hash a resource id into a fixed-length, filesystem-safe key.
///
/// Remote ids may contain characters that are not valid in file names, so
/// the raw id never reaches the filesystem.
pub fn record_key(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

/// Shard directory (first byte of the key, as hex) for a record.
pub fn record_shard(key: &str) -> &str {
    &key[0..2]
}

/// Full path of a record's JSON file.
pub fn record_path(cache_root: &Path, collection: &str, id: &str) -> PathBuf {
    let key = record_key(id);
    cache_root
        .join(collection)
        .join(record_shard(&key))
        .join(format!("{}.json", key))
}

/// Full path of a record's binary payload file.
pub fn payload_path(cache_root: &Path, collection: &str, id: &str) -> PathBuf {
    let key = record_key(id);
    cache_root
        .join(collection)
        .join(record_shard(&key))
        .join(format!("{}.bin", key))
}

/// Path of the schema state file.
pub fn schema_path(cache_root: &Path) -> PathBuf {
    cache_root.join("schema.json")
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, then rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

/// Write a JSON file atomically (compact format).
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| anyhow!("Failed to serialize JSON: {}", e))?;
    atomic_write(path, &json)
}
