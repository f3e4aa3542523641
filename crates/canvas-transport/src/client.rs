//! Remote file store abstraction.
//!
//! [`RemoteClient`] is the only way the cache layer talks to the network.
//! Implementations: [`crate::HttpRemoteClient`] for the real API and
//! [`crate::MockRemoteClient`] for tests.

use std::collections::{BTreeMap, HashMap};

use canvas_types::{Capabilities, FileMetadata, FileRecord, MetadataPatch, NewFile};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::RemoteError;

/// Field mask requested for file metadata unless the caller overrides it.
pub const DEFAULT_FILE_FIELDS: &str = "id,name,mimeType,trashed,\
capabilities(canDownload,canEdit,canTrash),md5Checksum,size,parents,properties,modifiedTime";

/// Per-item outcome of a batch request.
pub type BatchResults = HashMap<String, Result<RemoteFile, RemoteError>>;

/// File metadata exactly as the remote reports it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(
        rename = "md5Checksum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub checksum: Option<String>,
    /// The remote encodes int64 values as strings.
    #[serde(
        default,
        deserialize_with = "size_from_string_or_number",
        serialize_with = "size_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

impl RemoteFile {
    /// Convert into a cache record stamped with `loaded_at`.
    pub fn into_record(self, loaded_at: i64) -> FileRecord {
        FileRecord::new(
            self.id,
            FileMetadata {
                name: self.name,
                mime_type: self.mime_type,
                trashed: self.trashed,
                capabilities: self.capabilities,
                checksum: self.checksum,
                size: self.size,
                parents: self.parents,
                properties: self.properties,
                modified_time: self.modified_time,
            },
            loaded_at,
        )
    }

    /// Build the remote view of a cached record.
    pub fn from_record(record: &FileRecord) -> Self {
        let meta = &record.metadata;
        Self {
            id: record.id.clone(),
            name: meta.name.clone(),
            mime_type: meta.mime_type.clone(),
            trashed: meta.trashed,
            capabilities: meta.capabilities.clone(),
            checksum: meta.checksum.clone(),
            size: meta.size,
            parents: meta.parents.clone(),
            properties: meta.properties.clone(),
            modified_time: meta.modified_time.clone(),
        }
    }

    /// Apply a metadata patch the way the remote does.
    pub fn apply_patch(&mut self, patch: &MetadataPatch) {
        let patched = self.clone().into_record(0).with_patch(patch);
        *self = Self::from_record(&patched);
    }

    /// Build the remote view of a file about to be created.
    pub fn from_new(id: impl Into<String>, new: &NewFile) -> Self {
        Self {
            id: id.into(),
            name: Some(new.name.clone()),
            mime_type: new.mime_type.clone(),
            parents: new.parents.clone(),
            properties: new.properties.clone(),
            ..Self::default()
        }
    }
}

fn size_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size: {}", n))),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid size '{}': {}", s, e))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid size: {}",
            other
        ))),
    }
}

fn size_as_string<S>(size: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match size {
        Some(n) => serializer.serialize_str(&n.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Downloaded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub bytes: Vec<u8>,
    /// Checksum the remote reported for these bytes, when it reports one.
    pub checksum: Option<String>,
}

/// Primitives of the remote file API.
///
/// All calls may fail with [`RemoteError`]; implementations must report a
/// missing resource as [`RemoteError::NotFound`].
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch one file's metadata.
    async fn get(&self, id: &str, fields: &str) -> Result<RemoteFile, RemoteError>;

    /// Fetch many files' metadata in one round trip.
    ///
    /// The outer error means the whole batch failed; per-item failures are
    /// reported in the map.
    async fn batch_get(&self, ids: &[String], fields: &str) -> Result<BatchResults, RemoteError>;

    /// Query files.
    async fn list(
        &self,
        query: &str,
        fields: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Create a file, optionally with initial content.
    async fn create(
        &self,
        metadata: &NewFile,
        content: Option<&[u8]>,
    ) -> Result<RemoteFile, RemoteError>;

    /// Patch a file's metadata.
    async fn update_metadata(
        &self,
        id: &str,
        patch: &MetadataPatch,
    ) -> Result<RemoteFile, RemoteError>;

    /// Replace a file's content, optionally patching metadata in the same call.
    async fn update_media(
        &self,
        id: &str,
        bytes: &[u8],
        metadata: Option<&MetadataPatch>,
    ) -> Result<RemoteFile, RemoteError>;

    /// Download a file's content.
    async fn download_media(&self, id: &str) -> Result<DownloadedMedia, RemoteError>;

    /// Move a file to the trash, or restore it when `restore` is set.
    async fn delete(&self, id: &str, restore: bool) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_file_parses_string_size() {
        let file: RemoteFile = serde_json::from_value(json!({
            "id": "1abc",
            "name": "sketch.png",
            "mimeType": "image/png",
            "md5Checksum": "9e107d9d372bb6826bd81d3542a419d6",
            "size": "2048",
            "parents": ["root"],
            "capabilities": {"canDownload": true, "canEdit": false, "canTrash": false}
        }))
        .unwrap();

        assert_eq!(file.size, Some(2048));
        assert!(!file.capabilities.can_edit);

        let record = file.clone().into_record(99);
        assert_eq!(record.id, "1abc");
        assert_eq!(record.loaded_at, 99);
        assert_eq!(record.metadata.checksum, file.checksum);
        assert_eq!(RemoteFile::from_record(&record), file);
    }

    #[test]
    fn test_remote_file_folder_has_no_size() {
        let file: RemoteFile = serde_json::from_value(json!({
            "id": "folder",
            "mimeType": "application/vnd.google-apps.folder"
        }))
        .unwrap();
        assert_eq!(file.size, None);
        assert_eq!(file.checksum, None);

        let encoded = serde_json::to_value(&file).unwrap();
        assert!(encoded.get("size").is_none());
    }

    #[test]
    fn test_size_serializes_as_string() {
        let file = RemoteFile {
            id: "x".to_string(),
            size: Some(0),
            ..RemoteFile::default()
        };
        assert_eq!(serde_json::to_value(&file).unwrap()["size"], json!("0"));
    }

    #[test]
    fn test_apply_patch_trashes() {
        let mut file = RemoteFile {
            id: "x".to_string(),
            ..RemoteFile::default()
        };
        file.apply_patch(&MetadataPatch::trashed(true));
        assert!(file.trashed);
    }
}
