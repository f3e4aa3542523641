//! File metadata records.
//!
//! A [`FileRecord`] is the cache layer's copy of one remote file's metadata.
//! Callers receive clones; every mutation goes through the coordinator so the
//! memory registry and the durable store stay in step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier of a remote file.
pub type ResourceId = String;

/// What the current user may do with a file.
///
/// Missing capability fields default to allowed; the remote only omits them
/// when it did not evaluate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub can_download: bool,
    pub can_edit: bool,
    pub can_trash: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_download: true,
            can_edit: true,
            can_trash: true,
        }
    }
}

impl Capabilities {
    /// Capabilities of a file the user may only look at.
    pub fn read_only() -> Self {
        Self {
            can_download: true,
            can_edit: false,
            can_trash: false,
        }
    }
}

/// Mutable metadata fields of a remote file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileMetadata {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub trashed: bool,
    pub capabilities: Capabilities,
    /// Content checksum as reported by the remote store.
    pub checksum: Option<String>,
    /// Declared content size in bytes. `None` for folders and native documents.
    pub size: Option<u64>,
    pub parents: Vec<ResourceId>,
    pub properties: BTreeMap<String, Value>,
    pub modified_time: Option<String>,
}

/// Cached metadata for one remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: ResourceId,
    #[serde(flatten)]
    pub metadata: FileMetadata,
    /// Set while a media download for this id is in flight. Never persisted.
    #[serde(skip)]
    pub loading: bool,
    /// Milliseconds since the Unix epoch of the last successful refresh.
    pub loaded_at: i64,
}

impl FileRecord {
    pub fn new(id: impl Into<ResourceId>, metadata: FileMetadata, loaded_at: i64) -> Self {
        Self {
            id: id.into(),
            metadata,
            loading: false,
            loaded_at,
        }
    }

    /// Age of the record relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.loaded_at)
    }

    /// Whether the record was refreshed within `window_ms` of `now_ms`.
    pub fn is_fresh(&self, now_ms: i64, window_ms: i64) -> bool {
        self.age_ms(now_ms) <= window_ms
    }

    /// Whether the remote declared the content to be empty.
    pub fn is_zero_bytes(&self) -> bool {
        self.metadata.size == Some(0)
    }

    /// Return a new record with `patch` applied. `self` is left untouched so
    /// the caller can restore it if the remote rejects the change.
    pub fn with_patch(&self, patch: &MetadataPatch) -> FileRecord {
        let mut next = self.clone();
        let meta = &mut next.metadata;
        if let Some(name) = &patch.name {
            meta.name = Some(name.clone());
        }
        if let Some(mime_type) = &patch.mime_type {
            meta.mime_type = Some(mime_type.clone());
        }
        if let Some(trashed) = patch.trashed {
            meta.trashed = trashed;
        }
        if let Some(parents) = &patch.parents {
            meta.parents = parents.clone();
        }
        for (key, value) in &patch.properties {
            if value.is_null() {
                meta.properties.remove(key);
            } else {
                meta.properties.insert(key.clone(), value.clone());
            }
        }
        next
    }
}

/// A partial metadata update.
///
/// Property entries are merged into the existing map; a `null` value removes
/// the key, matching the remote API's merge semantics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<ResourceId>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, Value>,
}

impl MetadataPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn trashed(trashed: bool) -> Self {
        Self {
            trashed: Some(trashed),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Metadata for a file that does not exist yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parents: Vec<ResourceId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, Value>,
}
