//! Binary payloads paired with the checksum they were fetched for.

use serde::{Deserialize, Serialize};

use crate::file::{FileRecord, ResourceId};

/// A downloaded file payload.
///
/// Only valid while `checksum` equals the owning [`FileRecord`]'s checksum;
/// once the record moves on, the object is stale and must be treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaObject {
    pub id: ResourceId,
    pub checksum: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub loaded_at: i64,
}

impl MediaObject {
    pub fn new(
        id: impl Into<ResourceId>,
        checksum: impl Into<String>,
        payload: Vec<u8>,
        loaded_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            checksum: checksum.into(),
            payload,
            loaded_at,
        }
    }

    /// Stub for a file whose declared size is zero.
    pub fn empty(id: impl Into<ResourceId>, checksum: impl Into<String>, loaded_at: i64) -> Self {
        Self::new(id, checksum, Vec::new(), loaded_at)
    }

    pub fn matches_checksum(&self, checksum: &str) -> bool {
        self.checksum == checksum
    }

    /// Whether this payload is still current for `record`.
    pub fn is_valid_for(&self, record: &FileRecord) -> bool {
        self.id == record.id
            && record
                .metadata
                .checksum
                .as_deref()
                .is_some_and(|sum| self.matches_checksum(sum))
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
