//! Binary content access.
//!
//! Payloads are cached keyed by `(id, checksum)`: a payload is only served
//! while its checksum equals the checksum on the file's current record.
//! Metadata always comes from [`FileAccessCoordinator`], so a download sees
//! exactly the record a metadata read would.

use std::sync::Arc;

use canvas_types::{now_ms, FileRecord, MediaObject, MetadataPatch, NewFile, RetrievalStrategy};
use futures::FutureExt;
use tracing::{debug, warn};

use crate::dedup::{OpToken, PendingRelease, RequestDeduplicator, SharedOp};
use crate::error::{SyncError, SyncResult};
use crate::files::FileAccessCoordinator;
use crate::guard::LoadingGuard;

/// Strategy-driven access to file content.
#[derive(Clone)]
pub struct MediaAccessCoordinator {
    files: FileAccessCoordinator,
    pending: Arc<RequestDeduplicator<MediaObject>>,
}

impl MediaAccessCoordinator {
    pub fn new(files: FileAccessCoordinator) -> Self {
        Self {
            files,
            pending: Arc::new(RequestDeduplicator::new("media")),
        }
    }

    pub fn files(&self) -> &FileAccessCoordinator {
        &self.files
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    /// Resolve a file's content.
    ///
    /// `file_strategy` governs the metadata lookup; `media_strategy` governs
    /// the payload lookup. `Ok(None)` means the payload is not cached and the
    /// strategy does not allow fetching it. `Recent` behaves like `Lazy` for
    /// payloads: freshness is decided by the metadata checksum.
    pub async fn download_media(
        &self,
        id: &str,
        media_strategy: RetrievalStrategy,
        file_strategy: RetrievalStrategy,
    ) -> SyncResult<Option<MediaObject>> {
        let record = self
            .files
            .get_file(id, file_strategy)
            .await?
            .ok_or_else(|| SyncError::not_found(id))?;

        if !record.metadata.capabilities.can_download {
            return Err(SyncError::permission_denied(id, "download"));
        }
        let Some(checksum) = record.metadata.checksum.clone() else {
            return Err(SyncError::invalid_state(id, "file has no content checksum"));
        };

        if record.is_zero_bytes() {
            let stub = MediaObject::empty(id, checksum, now_ms());
            self.files.metrics().record_zero_byte_stub();
            self.store_media(&stub).await;
            return Ok(Some(stub));
        }

        if media_strategy != RetrievalStrategy::Source {
            if let Some(media) = self.lookup(&record, media_strategy).await {
                return Ok(Some(media));
            }
            match media_strategy {
                RetrievalStrategy::CacheOnly => return Err(SyncError::not_found(id)),
                RetrievalStrategy::Passive | RetrievalStrategy::OptimisticCache => return Ok(None),
                _ => {}
            }
        }

        self.fetch(&record, checksum).await.map(Some)
    }

    /// Valid payload from memory, then (if the strategy allows) durable.
    async fn lookup(&self, record: &FileRecord, strategy: RetrievalStrategy) -> Option<MediaObject> {
        let memory = self.files.memory();
        if let Some(media) = memory.get_valid_media(record) {
            self.files.metrics().record_media_memory_hit();
            return Some(media);
        }
        if !strategy.consults_durable() {
            return None;
        }
        match self.files.durable().get_media(&record.id).await {
            Ok(Some(media)) if media.is_valid_for(record) => {
                self.files.metrics().record_media_durable_hit();
                memory.put_media(media.clone());
                Some(media)
            }
            Ok(Some(_)) => {
                debug!(id = %record.id, "durable media is stale, ignoring");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(id = %record.id, error = %e, "durable media read failed, treating as miss");
                None
            }
        }
    }

    /// Download the payload for `checksum`, joining a download already in
    /// flight for the id. A joined download that was started for another
    /// checksum does not satisfy the caller; once it finishes the id is
    /// claimed again.
    async fn fetch(&self, record: &FileRecord, checksum: String) -> SyncResult<MediaObject> {
        let ids = vec![record.id.clone()];
        loop {
            let claim = self.pending.claim(&ids, |claimed, token| {
                self.spawn_download(claimed, token, checksum.clone())
            });
            self.files
                .metrics()
                .record_dedup_joins(claim.joined.len() as u64);

            let Some((_, op)) = claim.all_ops().into_iter().next() else {
                return Err(SyncError::invalid_state(record.id.clone(), "no download registered"));
            };
            let media = op.await?;
            if media.checksum == checksum {
                return Ok(media);
            }
            debug!(
                id = %record.id,
                expected = %checksum,
                joined = %media.checksum,
                "joined download was for another checksum, downloading again"
            );
        }
    }

    fn spawn_download(&self, ids: Vec<String>, token: OpToken, checksum: String) -> SharedOp<MediaObject> {
        let this = self.clone();
        let task_ids = ids.clone();
        let handle = tokio::spawn(async move {
            let _release = PendingRelease::new(this.pending.clone(), task_ids.clone(), token);
            this.run_download(task_ids, checksum).await
        });
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(SyncError::Transport {
                    ids,
                    message: format!("download task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run_download(&self, ids: Vec<String>, checksum: String) -> SyncResult<MediaObject> {
        let Some(id) = ids.first().cloned() else {
            return Err(SyncError::NotFound { ids });
        };
        let _loading = LoadingGuard::new(self.files.memory().clone(), id.clone());
        self.files.metrics().record_media_download();
        debug!(id = %id, "downloading media");

        let remote = self.files.remote().clone();
        let downloaded = self
            .files
            .guard()
            .call(&ids, remote.download_media(&id))
            .await?;

        let media = MediaObject::new(id.clone(), checksum.clone(), downloaded.bytes, now_ms());
        match downloaded.checksum {
            Some(reported) if reported != checksum => {
                warn!(
                    id = %id,
                    expected = %checksum,
                    reported = %reported,
                    "downloaded content does not match file checksum, not caching"
                );
            }
            _ => self.store_media(&media).await,
        }
        Ok(media)
    }

    /// Cache a payload in memory, then durable storage.
    async fn store_media(&self, media: &MediaObject) {
        self.files.memory().put_media(media.clone());
        if let Err(e) = self.files.durable().put_media(media).await {
            self.files.metrics().record_durable_write_failure();
            warn!(id = %media.id, error = %e, "durable media write failed");
        }
    }

    /// Cache content just uploaded for `record`, under the record's checksum.
    pub async fn cache_uploaded(&self, record: &FileRecord, bytes: Vec<u8>) -> SyncResult<MediaObject> {
        let Some(checksum) = record.metadata.checksum.clone() else {
            return Err(SyncError::invalid_state(
                record.id.clone(),
                "remote did not report a checksum for uploaded content",
            ));
        };
        let media = MediaObject::new(record.id.clone(), checksum, bytes, now_ms());
        self.store_media(&media).await;
        Ok(media)
    }

    /// Replace a file's content and cache it under the new checksum.
    pub async fn update_media(&self, id: &str, bytes: Vec<u8>) -> SyncResult<MediaObject> {
        let (target, upload) = (id.to_string(), bytes.clone());
        let record = self
            .files
            .mutate(
                id,
                "edit",
                |caps| caps.can_edit,
                MetadataPatch::default(),
                Box::new(move |remote: Arc<dyn canvas_transport::RemoteClient>| {
                    async move { remote.update_media(&target, &upload, None).await.map(Some) }
                        .boxed()
                }),
            )
            .await?;
        self.cache_uploaded(&record, bytes).await
    }

    /// Create a file, caching its content when some is supplied.
    pub async fn create_file(&self, metadata: &NewFile, content: Option<Vec<u8>>) -> SyncResult<FileRecord> {
        let record = self.files.create_file(metadata, content.as_deref()).await?;
        if let Some(bytes) = content {
            if let Err(e) = self.cache_uploaded(&record, bytes).await {
                warn!(id = %record.id, error = %e, "created file content not cached");
            }
        }
        Ok(record)
    }

    /// Valid payload from memory only; never touches disk or network.
    pub fn cached_media(&self, id: &str) -> Option<MediaObject> {
        let record = self.files.memory().get_file(id)?;
        self.files.memory().get_valid_media(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetcherConfig;
    use crate::memory::MemoryRegistry;
    use canvas_durable_cache::DurableStore;
    use canvas_transport::{checksum_of, MockRemoteClient, RemoteFile};
    use canvas_types::{Capabilities, RecordingNotifier};

    fn media_coordinator(remote: &MockRemoteClient) -> MediaAccessCoordinator {
        MediaAccessCoordinator::new(FileAccessCoordinator::new(
            Arc::new(remote.clone()),
            Arc::new(MemoryRegistry::new()),
            DurableStore::disabled(Arc::new(RecordingNotifier::new())),
            FetcherConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_lazy_download_then_memory_hit() {
        let remote = MockRemoteClient::new();
        remote.add_media("img", b"pixels".to_vec());
        let media = media_coordinator(&remote);

        let first = media
            .download_media("img", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.payload, b"pixels".to_vec());
        assert_eq!(first.checksum, checksum_of(b"pixels"));

        let second = media
            .download_media("img", RetrievalStrategy::CacheOnly, RetrievalStrategy::Lazy)
            .await
            .unwrap();
        assert_eq!(second, Some(first));
        assert_eq!(remote.download_calls(), 1);
        assert!(!media.files().memory().is_loading("img"));
    }

    #[tokio::test]
    async fn test_missing_checksum_is_invalid_state() {
        let remote = MockRemoteClient::new();
        remote.add_file(RemoteFile {
            id: "doc".to_string(),
            ..RemoteFile::default()
        });
        let media = media_coordinator(&remote);

        let err = media
            .download_media("doc", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_download_forbidden_without_capability() {
        let remote = MockRemoteClient::new();
        remote.add_media("img", b"x".to_vec());
        let mut file = remote.file("img").unwrap();
        file.capabilities = Capabilities {
            can_download: false,
            ..Capabilities::default()
        };
        remote.add_file(file);
        let media = media_coordinator(&remote);

        let err = media
            .download_media("img", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::permission_denied("img", "download"));
        assert_eq!(remote.download_calls(), 0);
    }

    #[tokio::test]
    async fn test_optimistic_and_passive_misses_return_none() {
        let remote = MockRemoteClient::new();
        remote.add_media("img", b"x".to_vec());
        let media = media_coordinator(&remote);

        for strategy in [RetrievalStrategy::OptimisticCache, RetrievalStrategy::Passive] {
            let result = media
                .download_media("img", strategy, RetrievalStrategy::Lazy)
                .await
                .unwrap();
            assert_eq!(result, None);
        }
        let err = media
            .download_media("img", RetrievalStrategy::CacheOnly, RetrievalStrategy::Lazy)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(remote.download_calls(), 0);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_returned_but_not_cached() {
        let remote = MockRemoteClient::new();
        remote.add_media("img", b"x".to_vec());
        remote.report_checksum("img", "something-else");
        let media = media_coordinator(&remote);

        let fetched = media
            .download_media("img", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
            .await
            .unwrap();
        assert!(fetched.is_some());
        assert_eq!(media.cached_media("img"), None);
    }

    #[tokio::test]
    async fn test_update_media_caches_new_checksum() {
        let remote = MockRemoteClient::new();
        remote.add_media("img", b"v1".to_vec());
        let media = media_coordinator(&remote);
        media
            .download_media("img", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
            .await
            .unwrap();

        let updated = media.update_media("img", b"v2".to_vec()).await.unwrap();
        assert_eq!(updated.checksum, checksum_of(b"v2"));
        assert_eq!(media.cached_media("img"), Some(updated));
        assert_eq!(remote.download_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_with_content_is_cached() {
        let remote = MockRemoteClient::new();
        let media = media_coordinator(&remote);

        let record = media
            .create_file(
                &NewFile {
                    name: "pasted.png".to_string(),
                    ..NewFile::default()
                },
                Some(b"png".to_vec()),
            )
            .await
            .unwrap();

        let cached = media.cached_media(&record.id).unwrap();
        assert_eq!(cached.payload, b"png".to_vec());
        assert_eq!(remote.download_calls(), 0);
    }
}
