//! Sync session management.
//!
//! `SyncSession` owns every cache component for one application session:
//! the durable store (or its disabled stand-in), the memory registry, both
//! coordinators with their request registries, shared metrics, and the
//! shutdown signal. Construct one at session start and call
//! [`SyncSession::shutdown`] at the end.
//!
//! ## Usage
//!
//! ```ignore
//! let session = SyncSession::connect(SyncConfig::from_env()).await;
//! let records = session.get_files(&ids, RetrievalStrategy::Recent).await?;
//! let image = session
//!     .download_media(&id, RetrievalStrategy::Lazy, RetrievalStrategy::Recent)
//!     .await?;
//! session.shutdown();
//! ```

use std::sync::Arc;

use anyhow::Result;
use canvas_durable_cache::{CacheMetrics, CacheStats, DurableStore, MetricsSnapshot};
use canvas_fetcher::{
    FileAccessCoordinator, MediaAccessCoordinator, MemoryRegistry, ShutdownSignal, SyncResult,
};
use canvas_transport::{HttpRemoteClient, RemoteClient, StaticToken};
use canvas_types::{
    FileRecord, MediaObject, MetadataPatch, NewFile, Notifier, ResourceId, RetrievalStrategy,
    TracingNotifier,
};
use serde::Serialize;
use tracing::info;

use crate::config::SyncConfig;

/// Memory and durable usage plus counters, for `cache-info`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub memory_files: usize,
    pub memory_media: usize,
    pub memory_media_bytes: usize,
    pub durable: CacheStats,
    pub metrics: MetricsSnapshot,
}

pub struct SyncSession {
    config: SyncConfig,
    files: FileAccessCoordinator,
    media: MediaAccessCoordinator,
    metrics: CacheMetrics,
    shutdown: ShutdownSignal,
}

impl SyncSession {
    /// Open the durable store named by `config` (or run memory-only) and wire
    /// the coordinators to `remote`. Never fails: an unusable durable store is
    /// reported once through `notifier`.
    pub async fn open(
        config: SyncConfig,
        remote: Arc<dyn RemoteClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let durable = match &config.cache_dir {
            Some(dir) => DurableStore::open_default(dir, notifier).await,
            None => DurableStore::disabled(notifier),
        };
        Self::with_store(config, remote, durable)
    }

    /// Wire a session around an already-opened store.
    pub fn with_store(config: SyncConfig, remote: Arc<dyn RemoteClient>, durable: DurableStore) -> Self {
        let metrics = CacheMetrics::default();
        let shutdown = ShutdownSignal::new();
        let files = FileAccessCoordinator::new(
            remote,
            Arc::new(MemoryRegistry::new()),
            durable,
            config.fetcher.clone(),
        )
        .with_metrics(metrics.clone())
        .with_shutdown(&shutdown);
        let media = MediaAccessCoordinator::new(files.clone());

        info!(
            durable = files.durable().is_available(),
            recent_window_ms = config.fetcher.recent_window_ms,
            "sync session started"
        );
        Self {
            config,
            files,
            media,
            metrics,
            shutdown,
        }
    }

    /// Session against the HTTP remote named by `config`, logging notices.
    pub async fn connect(config: SyncConfig) -> Self {
        let remote = Arc::new(Self::http_client(&config));
        Self::open(config, remote, Arc::new(TracingNotifier)).await
    }

    pub fn http_client(config: &SyncConfig) -> HttpRemoteClient {
        HttpRemoteClient::new(
            &config.endpoint,
            Arc::new(StaticToken::new(config.access_token.clone())),
        )
        .with_batch_limit(config.batch_limit)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn files(&self) -> &FileAccessCoordinator {
        &self.files
    }

    pub fn media(&self) -> &MediaAccessCoordinator {
        &self.media
    }

    pub fn memory(&self) -> &Arc<MemoryRegistry> {
        self.files.memory()
    }

    pub fn durable(&self) -> &DurableStore {
        self.files.durable()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ==================== Reads ====================

    pub async fn get_file(&self, id: &str, strategy: RetrievalStrategy) -> SyncResult<Option<FileRecord>> {
        self.files.get_file(id, strategy).await
    }

    pub async fn get_files(
        &self,
        ids: &[ResourceId],
        strategy: RetrievalStrategy,
    ) -> SyncResult<Vec<FileRecord>> {
        self.files.get_files(ids, strategy).await
    }

    pub async fn download_media(
        &self,
        id: &str,
        media_strategy: RetrievalStrategy,
        file_strategy: RetrievalStrategy,
    ) -> SyncResult<Option<MediaObject>> {
        self.media
            .download_media(id, media_strategy, file_strategy)
            .await
    }

    pub async fn list_files(&self, query: &str, order_by: Option<&str>) -> SyncResult<Vec<FileRecord>> {
        self.files.list_files(query, order_by).await
    }

    pub fn cached_media(&self, id: &str) -> Option<MediaObject> {
        self.media.cached_media(id)
    }

    // ==================== Writes ====================

    pub async fn put_files(&self, records: Vec<FileRecord>) {
        self.files.put_files(records).await
    }

    pub async fn create_file(&self, metadata: &NewFile, content: Option<Vec<u8>>) -> SyncResult<FileRecord> {
        self.media.create_file(metadata, content).await
    }

    pub async fn update_metadata(&self, id: &str, patch: &MetadataPatch) -> SyncResult<FileRecord> {
        self.files.update_metadata(id, patch).await
    }

    pub async fn update_media(&self, id: &str, bytes: Vec<u8>) -> SyncResult<MediaObject> {
        self.media.update_media(id, bytes).await
    }

    pub async fn trash_file(&self, id: &str) -> SyncResult<FileRecord> {
        self.files.trash_file(id).await
    }

    pub async fn restore_file(&self, id: &str) -> SyncResult<FileRecord> {
        self.files.restore_file(id).await
    }

    // ==================== Lifecycle ====================

    pub async fn cache_info(&self) -> Result<CacheInfo> {
        let memory = self.memory();
        Ok(CacheInfo {
            memory_files: memory.file_count(),
            memory_media: memory.media_count(),
            memory_media_bytes: memory.media_bytes(),
            durable: self.durable().stats().await?,
            metrics: self.metrics(),
        })
    }

    /// Cancel in-flight remote work and refuse new remote calls. Cached reads
    /// keep working.
    pub fn shutdown(&self) {
        if !self.shutdown.is_triggered() {
            info!(pending = self.files.pending_count() + self.media.pending_count(), "sync session shutting down");
        }
        self.shutdown.trigger();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_triggered()
    }
}
