//! Process-local registry of file records and media payloads.
//!
//! Thread-safe via internal `RwLock`s. Locks are held only for the duration
//! of a single map operation and never across an `.await`.
//!
//! # Example
//!
//! ```
//! use canvas_fetcher::memory::MemoryRegistry;
//! use canvas_types::{FileMetadata, FileRecord};
//!
//! let memory = MemoryRegistry::new();
//! memory.refresh_file(FileRecord::new("a", FileMetadata::default(), 10));
//! // A refresh stamped with an older clock still moves loaded_at forward.
//! let stored = memory.refresh_file(FileRecord::new("a", FileMetadata::default(), 5));
//! assert_eq!(stored.loaded_at, 11);
//! ```

use std::collections::HashMap;

use canvas_types::{FileRecord, MediaObject, ResourceId};
use parking_lot::RwLock;

/// In-memory cache keyed by resource id.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    files: RwLock<HashMap<ResourceId, FileRecord>>,
    /// At most one payload per id; validity is checked against the file's
    /// current checksum on every read.
    media: RwLock<HashMap<ResourceId, MediaObject>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== File Operations ====================

    pub fn get_file(&self, id: &str) -> Option<FileRecord> {
        self.files.read().get(id).cloned()
    }

    /// Records present for `ids`, in `ids` order.
    pub fn get_files(&self, ids: &[ResourceId]) -> Vec<FileRecord> {
        let files = self.files.read();
        ids.iter().filter_map(|id| files.get(id).cloned()).collect()
    }

    pub fn has_file(&self, id: &str) -> bool {
        self.files.read().contains_key(id)
    }

    /// Store records as given, except that an id's `loading` flag stays
    /// with whoever is downloading it.
    pub fn put_files(&self, records: impl IntoIterator<Item = FileRecord>) {
        let mut files = self.files.write();
        for mut record in records {
            if let Some(existing) = files.get(&record.id) {
                record.loading = existing.loading;
            }
            files.insert(record.id.clone(), record);
        }
    }

    /// Replace a record's content while keeping its current `loading` flag.
    /// Used for optimistic writes and their rollback.
    pub fn replace_file(&self, mut record: FileRecord) {
        let mut files = self.files.write();
        if let Some(existing) = files.get(&record.id) {
            record.loading = existing.loading;
        }
        files.insert(record.id.clone(), record);
    }

    /// Insert records loaded from durable storage unless memory already
    /// holds an equal or newer copy.
    pub fn promote_files(&self, records: impl IntoIterator<Item = FileRecord>) {
        let mut files = self.files.write();
        for record in records {
            match files.get(&record.id) {
                Some(existing) if existing.loaded_at >= record.loaded_at => {}
                _ => {
                    files.insert(record.id.clone(), record);
                }
            }
        }
    }

    /// Store the result of a successful remote refresh and return the stored
    /// copy. `loaded_at` is forced strictly past the previous value and the
    /// current `loading` flag is kept.
    pub fn refresh_file(&self, record: FileRecord) -> FileRecord {
        let mut files = self.files.write();
        Self::refresh_locked(&mut files, record)
    }

    pub fn refresh_files(&self, records: impl IntoIterator<Item = FileRecord>) -> Vec<FileRecord> {
        let mut files = self.files.write();
        records
            .into_iter()
            .map(|record| Self::refresh_locked(&mut files, record))
            .collect()
    }

    fn refresh_locked(files: &mut HashMap<ResourceId, FileRecord>, mut record: FileRecord) -> FileRecord {
        if let Some(previous) = files.get(&record.id) {
            record.loaded_at = record.loaded_at.max(previous.loaded_at + 1);
            record.loading = previous.loading;
        }
        files.insert(record.id.clone(), record.clone());
        record
    }

    /// Set the `loading` flag of an existing record. Returns whether the
    /// record exists.
    pub fn set_loading(&self, id: &str, loading: bool) -> bool {
        match self.files.write().get_mut(id) {
            Some(record) => {
                record.loading = loading;
                true
            }
            None => false,
        }
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.files.read().get(id).is_some_and(|r| r.loading)
    }

    // ==================== Media Operations ====================

    /// Raw media entry, valid or not.
    pub fn get_media(&self, id: &str) -> Option<MediaObject> {
        self.media.read().get(id).cloned()
    }

    /// Media for `record`, only if cached under the record's checksum.
    pub fn get_valid_media(&self, record: &FileRecord) -> Option<MediaObject> {
        self.media
            .read()
            .get(&record.id)
            .filter(|media| media.is_valid_for(record))
            .cloned()
    }

    pub fn put_media(&self, media: MediaObject) {
        self.media.write().insert(media.id.clone(), media);
    }

    // ==================== Statistics ====================

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn media_count(&self) -> usize {
        self.media.read().len()
    }

    /// Total cached payload bytes.
    pub fn media_bytes(&self) -> usize {
        self.media.read().values().map(MediaObject::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty() && self.media.read().is_empty()
    }

    pub fn clear(&self) {
        self.files.write().clear();
        self.media.write().clear();
    }
}
