//! Versioned schema for the durable cache.
//!
//! The schema version only ever grows. Opening a cache at version `N` runs the
//! upgrade callback once for every version in `(stored, N]`, lowest first, and
//! records progress after each step so an interrupted upgrade resumes where it
//! stopped.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::paths::{atomic_write_json, schema_path};

/// Collection holding [`canvas_types::FileRecord`]s.
pub const FILES_COLLECTION: &str = "files";
/// Collection holding media metadata plus payloads.
pub const MEDIA_COLLECTION: &str = "media";
/// Schema version this build writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Persisted schema state (`schema.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    pub version: u32,
    pub collections: BTreeSet<String>,
}

impl SchemaState {
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains(name)
    }
}

/// Handle passed to the upgrade callback for one version step.
pub struct SchemaUpgrade<'a> {
    root: &'a Path,
    state: &'a mut SchemaState,
}

impl SchemaUpgrade<'_> {
    /// Create a collection. Creating an existing collection is a no-op.
    pub fn create_collection(&mut self, name: &str) -> Result<()> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(anyhow!("Invalid collection name '{}'", name));
        }
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create collection {}: {}", dir.display(), e))?;
        self.state.collections.insert(name.to_string());
        Ok(())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.state.has_collection(name)
    }
}

/// Upgrade steps for the canvas cache layout.
pub fn canvas_upgrade(version: u32, upgrade: &mut SchemaUpgrade<'_>) -> Result<()> {
    match version {
        1 => upgrade.create_collection(FILES_COLLECTION),
        2 => upgrade.create_collection(MEDIA_COLLECTION),
        _ => Ok(()),
    }
}

fn load_state(root: &Path) -> Result<SchemaState> {
    let path = schema_path(root);
    if !path.exists() {
        return Ok(SchemaState::default());
    }
    let json = std::fs::read_to_string(&path)
        .map_err(|e| anyhow!("Failed to read schema file {}: {}", path.display(), e))?;
    serde_json::from_str(&json).map_err(|e| anyhow!("Failed to parse schema file: {}", e))
}

/// Open (creating if needed) the schema under `root` at `target_version`.
///
/// Fails when the stored version is newer than `target_version`, since this
/// build cannot know what a later layout means.
pub fn open_schema<F>(root: &Path, target_version: u32, upgrade: F) -> Result<SchemaState>
where
    F: Fn(u32, &mut SchemaUpgrade<'_>) -> Result<()>,
{
    std::fs::create_dir_all(root)
        .map_err(|e| anyhow!("Failed to create cache root {}: {}", root.display(), e))?;

    let mut state = load_state(root)?;
    if state.version > target_version {
        return Err(anyhow!(
            "Cache schema version {} is newer than supported version {}",
            state.version,
            target_version
        ));
    }

    for version in (state.version + 1)..=target_version {
        let mut step = SchemaUpgrade {
            root,
            state: &mut state,
        };
        upgrade(version, &mut step)?;
        state.version = version;
        atomic_write_json(&schema_path(root), &state)?;
        info!(version, root = %root.display(), "durable cache schema upgraded");
    }

    Ok(state)
}
