//! Durable cache store.
//!
//! [`DurableStore`] is either backed by a schema-versioned directory or
//! unavailable. An unavailable store reports that once through the
//! [`Notifier`] and then answers every read with nothing and accepts every
//! write without doing anything, so callers never branch on availability.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use canvas_types::{FileRecord, MediaObject, Notice, Notifier, ResourceId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::paths::{atomic_write, atomic_write_json, payload_path, record_path};
use crate::schema::{
    canvas_upgrade, open_schema, SchemaState, SchemaUpgrade, CURRENT_SCHEMA_VERSION,
    FILES_COLLECTION, MEDIA_COLLECTION,
};

/// Metadata for a cached media payload (stored separately from the bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMeta {
    pub id: ResourceId,
    pub checksum: String,
    pub size: u64,
    pub loaded_at: i64,
}

/// Per-collection usage figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub records: u64,
    pub bytes: u64,
}

/// Summary of a durable cache, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
    pub collections: BTreeMap<String, CollectionStats>,
}

struct FsBackend {
    root: PathBuf,
    schema: SchemaState,
}

impl FsBackend {
    fn check_collection(&self, collection: &str) -> Result<()> {
        if self.schema.has_collection(collection) {
            Ok(())
        } else {
            Err(anyhow!(
                "Collection '{}' does not exist at schema version {}",
                collection,
                self.schema.version
            ))
        }
    }

    fn put_json<T: Serialize>(&self, collection: &str, records: &[(ResourceId, T)]) -> Result<()> {
        self.check_collection(collection)?;
        for (id, record) in records {
            atomic_write_json(&record_path(&self.root, collection, id), record)?;
        }
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let path = record_path(&self.root, collection, id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read record {}: {}", path.display(), e))?;
        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // A corrupt entry is a miss; the next successful fetch rewrites it.
                warn!(collection, id, error = %e, "ignoring unreadable durable record");
                Ok(None)
            }
        }
    }

    fn get_many_json<T: DeserializeOwned>(&self, collection: &str, ids: &[ResourceId]) -> Result<Vec<T>> {
        self.check_collection(collection)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_json(collection, id)? {
                found.push(record);
            }
        }
        Ok(found)
    }

    fn put_media(&self, media: &MediaObject) -> Result<()> {
        self.check_collection(MEDIA_COLLECTION)?;
        let meta = MediaMeta {
            id: media.id.clone(),
            checksum: media.checksum.clone(),
            size: media.payload.len() as u64,
            loaded_at: media.loaded_at,
        };
        // Payload first: the metadata file is what makes the entry visible.
        atomic_write(&payload_path(&self.root, MEDIA_COLLECTION, &media.id), &media.payload)?;
        atomic_write_json(&record_path(&self.root, MEDIA_COLLECTION, &media.id), &meta)?;
        Ok(())
    }

    fn get_media(&self, id: &str) -> Result<Option<MediaObject>> {
        self.check_collection(MEDIA_COLLECTION)?;
        let Some(meta) = self.get_json::<MediaMeta>(MEDIA_COLLECTION, id)? else {
            return Ok(None);
        };
        let path = payload_path(&self.root, MEDIA_COLLECTION, id);
        if !path.exists() {
            return Ok(None);
        }
        let payload = std::fs::read(&path)
            .map_err(|e| anyhow!("Failed to read payload {}: {}", path.display(), e))?;
        if payload.len() as u64 != meta.size {
            warn!(
                id,
                expected = meta.size,
                actual = payload.len(),
                "ignoring truncated durable media payload"
            );
            return Ok(None);
        }
        Ok(Some(MediaObject::new(meta.id, meta.checksum, payload, meta.loaded_at)))
    }

    fn stats(&self) -> Result<BTreeMap<String, CollectionStats>> {
        let mut collections = BTreeMap::new();
        for name in &self.schema.collections {
            let mut stats = CollectionStats::default();
            let dir = self.root.join(name);
            if dir.is_dir() {
                for shard in std::fs::read_dir(&dir)
                    .map_err(|e| anyhow!("Failed to list {}: {}", dir.display(), e))?
                {
                    let shard = shard?.path();
                    if !shard.is_dir() {
                        continue;
                    }
                    for entry in std::fs::read_dir(&shard)? {
                        let entry = entry?;
                        let path = entry.path();
                        match path.extension().and_then(|e| e.to_str()) {
                            Some("json") => stats.records += 1,
                            Some("bin") => {}
                            _ => continue,
                        }
                        stats.bytes += entry.metadata()?.len();
                    }
                }
            }
            collections.insert(name.clone(), stats);
        }
        Ok(collections)
    }
}

/// Durable cache handle. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DurableStore {
    backend: Option<Arc<FsBackend>>,
    unavailable_reason: Option<String>,
    reported: Arc<AtomicBool>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("root", &self.root())
            .field("schema_version", &self.schema_version())
            .field("unavailable_reason", &self.unavailable_reason)
            .finish()
    }
}

impl DurableStore {
    /// Open the store under `root` at schema `version`.
    ///
    /// Never fails: any error yields an unavailable store, reported once.
    pub async fn open<F>(
        root: impl AsRef<Path>,
        version: u32,
        upgrade: F,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        F: Fn(u32, &mut SchemaUpgrade<'_>) -> Result<()> + Send + 'static,
    {
        let root = root.as_ref().to_path_buf();
        let opened = {
            let root = root.clone();
            tokio::task::spawn_blocking(move || open_schema(&root, version, upgrade))
                .await
                .map_err(|e| anyhow!("Schema open task failed: {}", e))
                .and_then(|result| result)
        };

        match opened {
            Ok(schema) => {
                debug!(root = %root.display(), version = schema.version, "durable cache opened");
                Self {
                    backend: Some(Arc::new(FsBackend { root, schema })),
                    unavailable_reason: None,
                    reported: Arc::new(AtomicBool::new(false)),
                    notifier,
                }
            }
            Err(e) => Self::unavailable(
                format!("failed to open {}: {}", root.display(), e),
                notifier,
            ),
        }
    }

    /// Open with the canvas layout at [`CURRENT_SCHEMA_VERSION`].
    pub async fn open_default(root: impl AsRef<Path>, notifier: Arc<dyn Notifier>) -> Self {
        Self::open(root, CURRENT_SCHEMA_VERSION, canvas_upgrade, notifier).await
    }

    /// A store that could not be opened. Reports `reason` once.
    pub fn unavailable(reason: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        let store = Self {
            backend: None,
            unavailable_reason: Some(reason.into()),
            reported: Arc::new(AtomicBool::new(false)),
            notifier,
        };
        store.report_unavailable();
        store
    }

    /// A store on a platform (or configuration) without durable storage.
    pub fn disabled(notifier: Arc<dyn Notifier>) -> Self {
        Self::unavailable("durable storage is disabled", notifier)
    }

    fn report_unavailable(&self) {
        let Some(reason) = &self.unavailable_reason else {
            return;
        };
        if !self.reported.swap(true, Ordering::SeqCst) {
            self.notifier.notify(Notice::PersistenceUnavailable {
                reason: reason.clone(),
            });
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    pub fn root(&self) -> Option<&Path> {
        self.backend.as_ref().map(|b| b.root.as_path())
    }

    pub fn schema_version(&self) -> Option<u32> {
        self.backend.as_ref().map(|b| b.schema.version)
    }

    /// Run `f` against the backend on the blocking pool, or return the
    /// default value when there is no backend.
    async fn with_backend<T, F>(&self, f: F) -> Result<T>
    where
        T: Default + Send + 'static,
        F: FnOnce(&FsBackend) -> Result<T> + Send + 'static,
    {
        let Some(backend) = self.backend.clone() else {
            return Ok(T::default());
        };
        tokio::task::spawn_blocking(move || f(&backend))
            .await
            .map_err(|e| anyhow!("Durable store task failed: {}", e))?
    }

    /// Write serialisable records into `collection`, keyed by id.
    pub async fn put<T>(&self, collection: &str, records: Vec<(ResourceId, T)>) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        if records.is_empty() {
            return Ok(());
        }
        let collection = collection.to_string();
        self.with_backend(move |b| b.put_json(&collection, &records))
            .await
    }

    /// Read the records of `collection` that exist among `ids`.
    /// Missing ids are skipped; order follows `ids`.
    pub async fn get_many<T>(&self, collection: &str, ids: &[ResourceId]) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let collection = collection.to_string();
        let ids = ids.to_vec();
        self.with_backend(move |b| b.get_many_json(&collection, &ids))
            .await
    }

    pub async fn put_files(&self, records: &[FileRecord]) -> Result<()> {
        let records = records
            .iter()
            .map(|record| (record.id.clone(), record.clone()))
            .collect();
        self.put(FILES_COLLECTION, records).await
    }

    pub async fn get_files(&self, ids: &[ResourceId]) -> Result<Vec<FileRecord>> {
        self.get_many(FILES_COLLECTION, ids).await
    }

    pub async fn put_media(&self, media: &MediaObject) -> Result<()> {
        let media = media.clone();
        self.with_backend(move |b| b.put_media(&media)).await
    }

    pub async fn get_media(&self, id: &str) -> Result<Option<MediaObject>> {
        let id = id.to_string();
        self.with_backend(move |b| b.get_media(&id)).await
    }

    /// Usage figures per collection.
    pub async fn stats(&self) -> Result<CacheStats> {
        let collections = self.with_backend(|b| b.stats()).await?;
        Ok(CacheStats {
            available: self.is_available(),
            root: self.root().map(Path::to_path_buf),
            schema_version: self.schema_version(),
            unavailable_reason: self.unavailable_reason.clone(),
            collections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_types::{FileMetadata, RecordingNotifier};
    use tempfile::TempDir;

    fn record(id: &str, loaded_at: i64) -> FileRecord {
        FileRecord::new(
            id,
            FileMetadata {
                name: Some(format!("{}.png", id)),
                checksum: Some(format!("sum-{}", id)),
                size: Some(4),
                ..FileMetadata::default()
            },
            loaded_at,
        )
    }

    #[tokio::test]
    async fn test_put_and_get_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let notifier = RecordingNotifier::new();
        let store = DurableStore::open_default(temp_dir.path(), Arc::new(notifier.clone())).await;
        assert!(store.is_available());
        assert_eq!(store.schema_version(), Some(CURRENT_SCHEMA_VERSION));

        store.put_files(&[record("a", 1), record("b", 2)]).await?;
        let found = store
            .get_files(&["b".to_string(), "missing".to_string(), "a".to_string()])
            .await?;

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "b");
        assert_eq!(found[1], record("a", 1));
        assert!(notifier.notices().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_record() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store =
            DurableStore::open_default(temp_dir.path(), Arc::new(RecordingNotifier::new())).await;
        store.put_files(&[record("a", 1)]).await?;
        store.put_files(&[record("a", 9)]).await?;

        let found = store.get_files(&["a".to_string()]).await?;
        assert_eq!(found[0].loaded_at, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_media_round_trip_requires_both_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store =
            DurableStore::open_default(temp_dir.path(), Arc::new(RecordingNotifier::new())).await;
        let media = MediaObject::new("img", "sum-1", vec![1, 2, 3], 5);
        store.put_media(&media).await?;

        assert_eq!(store.get_media("img").await?, Some(media));
        assert_eq!(store.get_media("other").await?, None);

        std::fs::remove_file(payload_path(temp_dir.path(), MEDIA_COLLECTION, "img"))?;
        assert_eq!(store.get_media("img").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_miss() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store =
            DurableStore::open_default(temp_dir.path(), Arc::new(RecordingNotifier::new())).await;
        store.put_files(&[record("a", 1)]).await?;
        std::fs::write(record_path(temp_dir.path(), FILES_COLLECTION, "a"), b"{not json")?;

        assert!(store.get_files(&["a".to_string()]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_once_and_no_ops() -> Result<()> {
        let notifier = RecordingNotifier::new();
        let store = DurableStore::disabled(Arc::new(notifier.clone()));

        store.put_files(&[record("a", 1)]).await?;
        assert!(store.get_files(&["a".to_string()]).await?.is_empty());
        assert_eq!(store.get_media("a").await?, None);

        let clone = store.clone();
        clone.report_unavailable();

        assert!(!store.is_available());
        assert_eq!(notifier.notices().len(), 1);
        assert!(matches!(
            &notifier.notices()[0],
            Notice::PersistenceUnavailable { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_open_failure_yields_unavailable_store() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file")?;

        let notifier = RecordingNotifier::new();
        let store = DurableStore::open_default(blocker.join("cache"), Arc::new(notifier.clone())).await;

        assert!(!store.is_available());
        assert!(store.unavailable_reason().is_some());
        assert_eq!(notifier.notices().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_collection_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = DurableStore::open(
            temp_dir.path(),
            1,
            canvas_upgrade,
            Arc::new(RecordingNotifier::new()),
        )
        .await;
        let media = MediaObject::new("img", "sum", vec![1], 0);
        assert!(store.put_media(&media).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_counts_records() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store =
            DurableStore::open_default(temp_dir.path(), Arc::new(RecordingNotifier::new())).await;
        store.put_files(&[record("a", 1), record("b", 1)]).await?;
        store
            .put_media(&MediaObject::new("a", "sum-a", vec![0; 16], 1))
            .await?;

        let stats = store.stats().await?;
        assert!(stats.available);
        assert_eq!(stats.collections[FILES_COLLECTION].records, 2);
        assert_eq!(stats.collections[MEDIA_COLLECTION].records, 1);
        assert!(stats.collections[MEDIA_COLLECTION].bytes >= 16);
        Ok(())
    }
}
