//! File metadata access.
//!
//! [`FileAccessCoordinator`] answers every metadata read according to a
//! [`RetrievalStrategy`]: memory first, then the durable store, then one
//! batched remote call for whatever is still missing. Remote work for an id
//! is shared between all callers through the request registry, and every
//! mutation of a record is routed through the same registry so reads and
//! writes of one id never overlap on the wire.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use canvas_durable_cache::{CacheMetrics, DurableStore};
use canvas_transport::{RemoteClient, RemoteError, RemoteFile};
use canvas_types::{
    now_ms, Capabilities, FileRecord, MetadataPatch, NewFile, ResourceId, RetrievalStrategy,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::config::FetcherConfig;
use crate::dedup::{OpToken, PendingRelease, RequestDeduplicator, SharedOp};
use crate::error::{SyncError, SyncResult};
use crate::guard::{RemoteCallGuard, ShutdownSignal};
use crate::memory::MemoryRegistry;

/// Per-id results of one remote operation.
///
/// Ids the remote reported as not found appear in neither map. A mutation
/// the remote refused carries its error in `rejected` and nothing else.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    found: HashMap<ResourceId, FileRecord>,
    failed: HashMap<ResourceId, String>,
    rejected: Option<SyncError>,
}

/// What a [`BatchOutcome`] says about one id.
#[derive(Debug, PartialEq)]
pub enum ItemOutcome<'a> {
    Found(&'a FileRecord),
    Failed(&'a str),
    Missing,
}

impl BatchOutcome {
    pub fn single(record: FileRecord) -> Self {
        let mut outcome = Self::default();
        outcome.found.insert(record.id.clone(), record);
        outcome
    }

    pub fn rejected(error: SyncError) -> Self {
        Self {
            rejected: Some(error),
            ..Self::default()
        }
    }

    /// The error of a refused mutation. Says nothing about the remote record.
    pub fn rejection(&self) -> Option<&SyncError> {
        self.rejected.as_ref()
    }

    pub fn item(&self, id: &str) -> ItemOutcome<'_> {
        if let Some(record) = self.found.get(id) {
            return ItemOutcome::Found(record);
        }
        match self.failed.get(id) {
            Some(message) => ItemOutcome::Failed(message),
            None => ItemOutcome::Missing,
        }
    }
}

type FileOp = SharedOp<Arc<BatchOutcome>>;

/// Boxed remote mutation run by [`FileAccessCoordinator::mutate`].
/// `Ok(None)` means the remote confirmed without returning metadata.
pub type RemoteMutation =
    Box<dyn FnOnce(Arc<dyn RemoteClient>) -> BoxFuture<'static, Result<Option<RemoteFile>, RemoteError>> + Send>;

/// Strategy-driven access to file metadata.
#[derive(Clone)]
pub struct FileAccessCoordinator {
    remote: Arc<dyn RemoteClient>,
    memory: Arc<MemoryRegistry>,
    durable: DurableStore,
    pending: Arc<RequestDeduplicator<Arc<BatchOutcome>>>,
    guard: RemoteCallGuard,
    metrics: CacheMetrics,
    config: FetcherConfig,
}

/// Deduplicate ids, keeping first-seen order.
fn unique_ids(ids: &[ResourceId]) -> Vec<ResourceId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

impl FileAccessCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        memory: Arc<MemoryRegistry>,
        durable: DurableStore,
        config: FetcherConfig,
    ) -> Self {
        let guard = RemoteCallGuard::new(config.remote_timeout, &ShutdownSignal::new());
        Self {
            remote,
            memory,
            durable,
            pending: Arc::new(RequestDeduplicator::new("files")),
            guard,
            metrics: CacheMetrics::default(),
            config,
        }
    }

    /// Share counters with other components.
    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Cancel remote work when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: &ShutdownSignal) -> Self {
        self.guard = RemoteCallGuard::new(self.config.remote_timeout, shutdown);
        self
    }

    pub fn memory(&self) -> &Arc<MemoryRegistry> {
        &self.memory
    }

    pub fn durable(&self) -> &DurableStore {
        &self.durable
    }

    pub fn remote(&self) -> &Arc<dyn RemoteClient> {
        &self.remote
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub(crate) fn guard(&self) -> &RemoteCallGuard {
        &self.guard
    }

    /// Number of ids with remote work in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    // ==================== Reads ====================

    /// Fetch one record. `Ok(None)` means "not known" under `strategy`.
    pub async fn get_file(&self, id: &str, strategy: RetrievalStrategy) -> SyncResult<Option<FileRecord>> {
        let mut records = self.get_files(&[id.to_string()], strategy).await?;
        Ok(records.pop())
    }

    /// Fetch many records. The result follows the order of `ids` (duplicates
    /// removed) and omits ids that are unknown under `strategy`.
    pub async fn get_files(
        &self,
        ids: &[ResourceId],
        strategy: RetrievalStrategy,
    ) -> SyncResult<Vec<FileRecord>> {
        let ids = unique_ids(ids);
        let now = now_ms();
        let window = strategy.staleness_window(self.config.recent_window_ms);
        let usable = |record: &FileRecord| window.map_or(true, |w| record.is_fresh(now, w));

        let mut resolved: HashMap<ResourceId, FileRecord> = HashMap::new();

        if strategy.consults_memory() {
            for record in self.memory.get_files(&ids) {
                if usable(&record) {
                    resolved.insert(record.id.clone(), record);
                }
            }
            self.metrics.record_memory_hits(resolved.len() as u64);
        }

        let mut missing: Vec<ResourceId> = ids
            .iter()
            .filter(|id| !resolved.contains_key(*id))
            .cloned()
            .collect();

        if strategy.consults_durable() && !missing.is_empty() {
            match self.durable.get_files(&missing).await {
                Ok(records) => {
                    let fresh: Vec<FileRecord> = records.into_iter().filter(|r| usable(r)).collect();
                    self.metrics.record_durable_hits(fresh.len() as u64);
                    self.memory.promote_files(fresh.iter().cloned());
                    for record in fresh {
                        resolved.insert(record.id.clone(), record);
                    }
                }
                Err(e) => warn!(error = %e, "durable cache read failed, treating as miss"),
            }
            missing.retain(|id| !resolved.contains_key(id));
        }

        if !missing.is_empty() {
            if strategy.fetches_missing() {
                resolved.extend(self.fetch(&missing).await?);
            } else if strategy == RetrievalStrategy::CacheOnly {
                return Err(SyncError::NotFound { ids: missing });
            } else {
                debug!(%strategy, missing = missing.len(), "returning cached subset");
            }
        }

        Ok(ids.iter().filter_map(|id| resolved.remove(id)).collect())
    }

    /// Fetch `ids` remotely, joining any operation already in flight.
    ///
    /// A joined mutation that the remote refused is not an answer for a
    /// read: those ids are claimed again once it has finished.
    async fn fetch(&self, ids: &[ResourceId]) -> SyncResult<HashMap<ResourceId, FileRecord>> {
        let mut fetched = HashMap::new();
        let mut failed: Vec<ResourceId> = Vec::new();
        let mut failure_message = None;
        let mut whole_failure = None;

        let mut remaining = ids.to_vec();
        while !remaining.is_empty() {
            let claim = self
                .pending
                .claim(&remaining, |claimed, token| self.spawn_batch(claimed, token));
            self.metrics.record_dedup_joins(claim.joined.len() as u64);
            remaining = Vec::new();

            for (id, op) in claim.all_ops() {
                match op.await {
                    Ok(outcome) if outcome.rejection().is_some() => {
                        debug!(id = %id, "joined a refused mutation, reading again");
                        remaining.push(id);
                    }
                    Ok(outcome) => match outcome.item(&id) {
                        ItemOutcome::Found(record) => {
                            fetched.insert(id, record.clone());
                        }
                        ItemOutcome::Failed(message) => {
                            failure_message.get_or_insert_with(|| message.to_string());
                            failed.push(id);
                        }
                        ItemOutcome::Missing => {}
                    },
                    Err(e) => {
                        whole_failure.get_or_insert(e);
                    }
                }
            }
            if whole_failure.is_some() {
                break;
            }
        }

        if let Some(e) = whole_failure {
            return Err(e);
        }
        if !failed.is_empty() {
            return Err(SyncError::Transport {
                ids: failed,
                message: failure_message.unwrap_or_default(),
            });
        }
        Ok(fetched)
    }

    /// Start one batch on the runtime. Abandoning the returned future does
    /// not stop the batch, and the registry entries go away when it ends.
    fn spawn_batch(&self, ids: Vec<ResourceId>, token: OpToken) -> FileOp {
        let this = self.clone();
        let batch_ids = ids.clone();
        let handle = tokio::spawn(async move {
            let _release = PendingRelease::new(this.pending.clone(), batch_ids.clone(), token);
            this.run_batch(batch_ids).await
        });
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(SyncError::Transport {
                    ids,
                    message: format!("batch task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run_batch(&self, ids: Vec<ResourceId>) -> SyncResult<Arc<BatchOutcome>> {
        self.metrics.record_remote_batch(ids.len() as u64);
        debug!(count = ids.len(), "fetching file metadata batch");

        let mut results = self
            .guard
            .call(&ids, self.remote.batch_get(&ids, &self.config.fields))
            .await
            .map_err(|e| match e {
                // A batch as a whole is never "not found".
                SyncError::NotFound { .. } => SyncError::Transport {
                    ids: ids.clone(),
                    message: e.to_string(),
                },
                other => other,
            })?;

        let loaded_at = now_ms();
        let mut found = Vec::new();
        let mut failed = HashMap::new();
        for id in &ids {
            match results.remove(id) {
                Some(Ok(file)) => {
                    let mut record = file.into_record(loaded_at);
                    record.id = id.clone();
                    found.push(record);
                }
                Some(Err(e)) if e.is_not_found() => {
                    debug!(id = %id, "remote reports file not found");
                }
                Some(Err(e)) => {
                    warn!(id = %id, error = %e, "file metadata fetch failed");
                    failed.insert(id.clone(), e.to_string());
                }
                None => {
                    failed.insert(id.clone(), "missing from batch response".to_string());
                }
            }
        }

        let stored = self.memory.refresh_files(found);
        self.persist_files(&stored).await;

        Ok(Arc::new(BatchOutcome {
            found: stored.into_iter().map(|r| (r.id.clone(), r)).collect(),
            failed,
            rejected: None,
        }))
    }

    /// Write records through to the durable store. Failures are absorbed.
    pub(crate) async fn persist_files(&self, records: &[FileRecord]) {
        if records.is_empty() {
            return;
        }
        if let Err(e) = self.durable.put_files(records).await {
            self.metrics.record_durable_write_failure();
            warn!(count = records.len(), error = %e, "durable cache write failed");
        }
    }

    // ==================== Writes ====================

    /// Insert records into memory, then the durable store, as given.
    pub async fn put_files(&self, records: Vec<FileRecord>) {
        self.memory.put_files(records.iter().cloned());
        self.persist_files(&records).await;
    }

    /// Run a remote query and cache every returned record.
    pub async fn list_files(&self, query: &str, order_by: Option<&str>) -> SyncResult<Vec<FileRecord>> {
        let files = self
            .guard
            .call(&[], self.remote.list(query, &self.config.fields, order_by))
            .await?;
        let loaded_at = now_ms();
        let stored = self
            .memory
            .refresh_files(files.into_iter().map(|f| f.into_record(loaded_at)));
        self.persist_files(&stored).await;
        debug!(query, count = stored.len(), "listed files");
        Ok(stored)
    }

    /// Create a remote file and cache its metadata.
    pub async fn create_file(&self, metadata: &NewFile, content: Option<&[u8]>) -> SyncResult<FileRecord> {
        let file = self
            .guard
            .call(&[], self.remote.create(metadata, content))
            .await?;
        let stored = self.memory.refresh_file(file.into_record(now_ms()));
        self.persist_files(std::slice::from_ref(&stored)).await;
        debug!(id = %stored.id, "created file");
        Ok(stored)
    }

    /// Patch metadata: the patched record is visible at once and replaced by
    /// the remote's answer, or restored if the remote rejects the change.
    pub async fn update_metadata(&self, id: &str, patch: &MetadataPatch) -> SyncResult<FileRecord> {
        if patch.is_empty() {
            return self
                .get_file(id, RetrievalStrategy::Lazy)
                .await?
                .ok_or_else(|| SyncError::not_found(id));
        }
        let (target, remote_patch) = (id.to_string(), patch.clone());
        self.mutate(
            id,
            "edit",
            |caps| caps.can_edit,
            patch.clone(),
            Box::new(move |remote: Arc<dyn RemoteClient>| {
                async move { remote.update_metadata(&target, &remote_patch).await.map(Some) }.boxed()
            }),
        )
        .await
    }

    pub async fn trash_file(&self, id: &str) -> SyncResult<FileRecord> {
        self.set_trashed(id, true).await
    }

    pub async fn restore_file(&self, id: &str) -> SyncResult<FileRecord> {
        self.set_trashed(id, false).await
    }

    async fn set_trashed(&self, id: &str, trashed: bool) -> SyncResult<FileRecord> {
        let target = id.to_string();
        self.mutate(
            id,
            if trashed { "trash" } else { "restore" },
            |caps| caps.can_trash,
            MetadataPatch::trashed(trashed),
            Box::new(move |remote: Arc<dyn RemoteClient>| {
                async move {
                    remote
                        .delete(&target, !trashed)
                        .await
                        .map(|()| None::<RemoteFile>)
                }
                .boxed()
            }),
        )
        .await
    }

    /// Apply a remote mutation to one record.
    ///
    /// The record is resolved (Lazy), its capabilities checked with
    /// `permitted`, and the id claimed in the request registry, waiting for
    /// any operation already in flight. The mutation then runs as its own
    /// task: `optimistic` is applied locally, the remote call is made, and
    /// the local copy is either replaced by the confirmed record or restored.
    pub async fn mutate(
        &self,
        id: &str,
        action: &str,
        permitted: fn(&Capabilities) -> bool,
        optimistic: MetadataPatch,
        call: RemoteMutation,
    ) -> SyncResult<FileRecord> {
        let current = self
            .get_file(id, RetrievalStrategy::Lazy)
            .await?
            .ok_or_else(|| SyncError::not_found(id))?;
        if !permitted(&current.metadata.capabilities) {
            return Err(SyncError::permission_denied(id, action));
        }

        let ids = vec![id.to_string()];
        let mut call = Some(call);
        let op = loop {
            let claim = self.pending.claim(&ids, |claimed, token| {
                let call = call.take();
                self.spawn_mutation(claimed, token, current.clone(), optimistic.clone(), call)
            });
            if let Some(op) = claim.op {
                break op;
            }
            // Someone else owns the id; wait for them and try again.
            for (_, pending) in claim.joined {
                let _ = pending.await;
            }
        };

        let outcome = op.await?;
        if let Some(e) = outcome.rejection() {
            return Err(e.clone());
        }
        match outcome.item(id) {
            ItemOutcome::Found(record) => Ok(record.clone()),
            _ => Err(SyncError::not_found(id)),
        }
    }

    fn spawn_mutation(
        &self,
        ids: Vec<ResourceId>,
        token: OpToken,
        resolved: FileRecord,
        optimistic: MetadataPatch,
        call: Option<RemoteMutation>,
    ) -> FileOp {
        let this = self.clone();
        let task_ids = ids.clone();
        let handle = tokio::spawn(async move {
            let _release = PendingRelease::new(this.pending.clone(), task_ids.clone(), token);
            match call {
                Some(call) => this.run_mutation(task_ids, resolved, optimistic, call).await,
                None => Err(SyncError::invalid_state(
                    resolved.id.clone(),
                    "mutation already started",
                )),
            }
        });
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(SyncError::Transport {
                    ids,
                    message: format!("mutation task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run_mutation(
        &self,
        ids: Vec<ResourceId>,
        resolved: FileRecord,
        optimistic: MetadataPatch,
        call: RemoteMutation,
    ) -> SyncResult<Arc<BatchOutcome>> {
        let id = resolved.id.clone();
        let previous = self.memory.get_file(&id).unwrap_or(resolved);
        let patched = previous.with_patch(&optimistic);
        self.memory.replace_file(patched.clone());

        match self.guard.call(&ids, call(self.remote.clone())).await {
            Ok(confirmed) => {
                let now = now_ms();
                let record = match confirmed {
                    Some(file) => file.into_record(now),
                    None => FileRecord {
                        loaded_at: now,
                        ..patched
                    },
                };
                let stored = self.memory.refresh_file(record);
                self.persist_files(std::slice::from_ref(&stored)).await;
                debug!(id = %id, "mutation confirmed");
                Ok(Arc::new(BatchOutcome::single(stored)))
            }
            Err(e) => {
                warn!(id = %id, error = %e, "mutation rejected, restoring previous record");
                self.memory.replace_file(previous);
                Ok(Arc::new(BatchOutcome::rejected(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_transport::MockRemoteClient;
    use canvas_types::{FileMetadata, RecordingNotifier};
    use std::time::Duration;

    fn remote_file(id: &str) -> RemoteFile {
        RemoteFile {
            id: id.to_string(),
            name: Some(format!("{}.canvas", id)),
            checksum: Some(format!("sum-{}", id)),
            size: Some(10),
            ..RemoteFile::default()
        }
    }

    fn coordinator(remote: &MockRemoteClient) -> FileAccessCoordinator {
        FileAccessCoordinator::new(
            Arc::new(remote.clone()),
            Arc::new(MemoryRegistry::new()),
            DurableStore::disabled(Arc::new(RecordingNotifier::new())),
            FetcherConfig::default(),
        )
    }

    fn ids(list: &[&str]) -> Vec<ResourceId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unique_ids_keeps_first_seen_order() {
        assert_eq!(unique_ids(&ids(&["b", "a", "b", "c", "a"])), ids(&["b", "a", "c"]));
    }

    #[tokio::test]
    async fn test_lazy_fetches_once_then_serves_memory() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a"));
        let files = coordinator(&remote);

        let first = files.get_files(&ids(&["a"]), RetrievalStrategy::Lazy).await.unwrap();
        let second = files.get_files(&ids(&["a"]), RetrievalStrategy::Lazy).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.batch_calls(), 1);
        assert_eq!(files.metrics().snapshot().memory_hits, 1);
        assert_eq!(files.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_not_found_items_are_omitted() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a"));
        let files = coordinator(&remote);

        let found = files
            .get_files(&ids(&["ghost", "a"]), RetrievalStrategy::Source)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(files.get_file("ghost", RetrievalStrategy::Lazy).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_item_failure_reports_only_failed_ids_and_caches_the_rest() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a")).add_file(remote_file("b"));
        remote.fail_item("b", RemoteError::Status { status: 500, message: "boom".to_string() });
        let files = coordinator(&remote);

        let err = files
            .get_files(&ids(&["a", "b"]), RetrievalStrategy::Source)
            .await
            .unwrap_err();
        assert!(matches!(&err, SyncError::Transport { ids, .. } if ids == &vec!["b".to_string()]));
        assert!(files.memory().has_file("a"));
        assert!(!files.memory().has_file("b"));
    }

    #[tokio::test]
    async fn test_batch_failure_reaches_caller_with_batch_ids() {
        let remote = MockRemoteClient::new();
        remote.set_error("connection reset");
        let files = coordinator(&remote);

        let err = files
            .get_files(&ids(&["a", "b"]), RetrievalStrategy::Lazy)
            .await
            .unwrap_err();
        assert_eq!(err.ids(), ids(&["a", "b"]));
        assert!(matches!(err, SyncError::Transport { .. }));
        assert_eq!(files.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_releases_registry() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a"));
        remote.set_latency(Duration::from_secs(5));
        let files = FileAccessCoordinator::new(
            Arc::new(remote.clone()),
            Arc::new(MemoryRegistry::new()),
            DurableStore::disabled(Arc::new(RecordingNotifier::new())),
            FetcherConfig::default().with_remote_timeout(Duration::from_millis(20)),
        );

        let err = files.get_file("a", RetrievalStrategy::Source).await.unwrap_err();
        assert_eq!(err, SyncError::Timeout { ids: ids(&["a"]) });
        assert_eq!(files.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_put_files_then_lazy_read_needs_no_remote() {
        let remote = MockRemoteClient::new();
        let files = coordinator(&remote);
        let record = FileRecord::new("local", FileMetadata::default(), now_ms());
        files.put_files(vec![record.clone()]).await;

        let found = files.get_file("local", RetrievalStrategy::Lazy).await.unwrap();
        assert_eq!(found, Some(record));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_metadata_confirms_remote_answer() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a"));
        let files = coordinator(&remote);

        let updated = files
            .update_metadata("a", &MetadataPatch::rename("renamed"))
            .await
            .unwrap();
        assert_eq!(updated.metadata.name.as_deref(), Some("renamed"));
        assert_eq!(
            remote.file("a").unwrap().name.as_deref(),
            Some("renamed")
        );
        assert_eq!(files.memory().get_file("a"), Some(updated));
    }

    #[tokio::test]
    async fn test_update_metadata_requires_edit_capability() {
        let remote = MockRemoteClient::new();
        remote.add_file(RemoteFile {
            capabilities: Capabilities::read_only(),
            ..remote_file("a")
        });
        let files = coordinator(&remote);

        let err = files
            .update_metadata("a", &MetadataPatch::rename("x"))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::permission_denied("a", "edit"));
        assert_eq!(remote.mutation_calls(), 0);
    }

    #[tokio::test]
    async fn test_trash_and_restore_toggle_flag() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a"));
        let files = coordinator(&remote);

        assert!(files.trash_file("a").await.unwrap().metadata.trashed);
        assert!(remote.file("a").unwrap().trashed);
        assert!(!files.restore_file("a").await.unwrap().metadata.trashed);
        assert!(files.memory().has_file("a"));
    }

    #[tokio::test]
    async fn test_list_and_create_cache_results() {
        let remote = MockRemoteClient::new();
        remote.add_file(remote_file("a"));
        let files = coordinator(&remote);

        let created = files
            .create_file(
                &NewFile {
                    name: "new.canvas".to_string(),
                    ..NewFile::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(files.memory().has_file(&created.id));

        let listed = files.list_files("", None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(files.memory().has_file("a"));
    }
}
