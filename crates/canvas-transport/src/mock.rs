//! In-memory [`RemoteClient`] for tests.
//!
//! `MockRemoteClient` serves pre-loaded files and media, counts every call,
//! and can be paused so tests can hold a request in flight while issuing
//! concurrent ones.
//!
//! ```
//! use canvas_transport::{MockRemoteClient, RemoteFile};
//!
//! let remote = MockRemoteClient::new();
//! remote.add_file(RemoteFile { id: "a".to_string(), ..RemoteFile::default() });
//! remote.add_media("a", b"hello".to_vec());
//! assert_eq!(remote.batch_calls(), 0);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canvas_types::{MetadataPatch, NewFile};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::client::{BatchResults, DownloadedMedia, RemoteClient, RemoteFile};
use crate::error::RemoteError;

/// Checksum the mock assigns to content: lowercase hex SHA-256.
pub fn checksum_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Default)]
struct MockState {
    files: HashMap<String, RemoteFile>,
    media: HashMap<String, Vec<u8>>,
    /// Checksums reported on download that differ from the stored file's.
    reported_checksums: HashMap<String, String>,
    item_errors: HashMap<String, RemoteError>,
    force_error: Option<String>,
    latency: Option<Duration>,
    batch_log: Vec<Vec<String>>,
    download_log: Vec<String>,
    next_id: u64,
}

#[derive(Default)]
struct CallCounters {
    get: AtomicUsize,
    batch: AtomicUsize,
    list: AtomicUsize,
    download: AtomicUsize,
    mutation: AtomicUsize,
}

struct MockInner {
    state: Mutex<MockState>,
    calls: CallCounters,
    paused: watch::Sender<bool>,
}

/// A remote file store held entirely in memory.
#[derive(Clone)]
pub struct MockRemoteClient {
    inner: Arc<MockInner>,
}

impl Default for MockRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteClient {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                calls: CallCounters::default(),
                paused,
            }),
        }
    }

    /// Add or replace a file.
    pub fn add_file(&self, file: RemoteFile) -> &Self {
        self.inner.state.lock().files.insert(file.id.clone(), file);
        self
    }

    /// Store content for an existing (or new, bare) file and update its
    /// checksum and size to match.
    pub fn add_media(&self, id: &str, bytes: Vec<u8>) -> &Self {
        let mut state = self.inner.state.lock();
        let file = state.files.entry(id.to_string()).or_insert_with(|| RemoteFile {
            id: id.to_string(),
            ..RemoteFile::default()
        });
        file.checksum = Some(checksum_of(&bytes));
        file.size = Some(bytes.len() as u64);
        state.media.insert(id.to_string(), bytes);
        self
    }

    /// Report `checksum` on download of `id` instead of the stored one.
    pub fn report_checksum(&self, id: &str, checksum: &str) -> &Self {
        self.inner
            .state
            .lock()
            .reported_checksums
            .insert(id.to_string(), checksum.to_string());
        self
    }

    /// Current remote view of a file.
    pub fn file(&self, id: &str) -> Option<RemoteFile> {
        self.inner.state.lock().files.get(id).cloned()
    }

    /// Make every call for `id` fail with `error`.
    pub fn fail_item(&self, id: &str, error: RemoteError) -> &Self {
        self.inner
            .state
            .lock()
            .item_errors
            .insert(id.to_string(), error);
        self
    }

    /// Force all subsequent calls to fail with a transport error.
    pub fn set_error(&self, error: &str) -> &Self {
        self.inner.state.lock().force_error = Some(error.to_string());
        self
    }

    /// Clear the forced error and per-item errors.
    pub fn clear_error(&self) -> &Self {
        let mut state = self.inner.state.lock();
        state.force_error = None;
        state.item_errors.clear();
        self
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        self.inner.state.lock().latency = Some(latency);
        self
    }

    /// Hold every call until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
    }

    pub fn get_calls(&self) -> usize {
        self.inner.calls.get.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.inner.calls.batch.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.inner.calls.list.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.inner.calls.download.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.inner.calls.mutation.load(Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.get_calls()
            + self.batch_calls()
            + self.list_calls()
            + self.download_calls()
            + self.mutation_calls()
    }

    /// Ids of every `batch_get` call, in call order.
    pub fn batch_log(&self) -> Vec<Vec<String>> {
        self.inner.state.lock().batch_log.clone()
    }

    pub fn download_log(&self) -> Vec<String> {
        self.inner.state.lock().download_log.clone()
    }

    async fn enter(&self) -> Result<(), RemoteError> {
        let latency = self.inner.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut paused = self.inner.paused.subscribe();
        // The sender lives in `inner`, so the channel cannot close here.
        let _ = paused.wait_for(|paused| !*paused).await;

        match self.inner.state.lock().force_error.clone() {
            Some(error) => Err(RemoteError::Transport(error)),
            None => Ok(()),
        }
    }

    fn lookup(state: &MockState, id: &str) -> Result<RemoteFile, RemoteError> {
        if let Some(error) = state.item_errors.get(id) {
            return Err(error.clone());
        }
        state
            .files
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound { id: id.to_string() })
    }

    fn lookup_mut<'a>(state: &'a mut MockState, id: &str) -> Result<&'a mut RemoteFile, RemoteError> {
        if let Some(error) = state.item_errors.get(id) {
            return Err(error.clone());
        }
        state
            .files
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound { id: id.to_string() })
    }
}

/// Minimal query support: clauses joined by ` and `, each either
/// `'<parent>' in parents` or `trashed = true|false`. Unknown clauses match.
fn query_matches(file: &RemoteFile, query: &str) -> bool {
    query
        .split(" and ")
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .all(|clause| {
            if let Some(parent) = clause.strip_suffix(" in parents") {
                let parent = parent.trim().trim_matches('\'');
                return file.parents.iter().any(|p| p == parent);
            }
            match clause.replace(' ', "").as_str() {
                "trashed=true" => file.trashed,
                "trashed=false" => !file.trashed,
                _ => true,
            }
        })
}

#[async_trait::async_trait]
impl RemoteClient for MockRemoteClient {
    async fn get(&self, id: &str, _fields: &str) -> Result<RemoteFile, RemoteError> {
        self.inner.calls.get.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Self::lookup(&self.inner.state.lock(), id)
    }

    async fn batch_get(&self, ids: &[String], _fields: &str) -> Result<BatchResults, RemoteError> {
        self.inner.calls.batch.fetch_add(1, Ordering::SeqCst);
        self.inner.state.lock().batch_log.push(ids.to_vec());
        self.enter().await?;

        let state = self.inner.state.lock();
        Ok(ids
            .iter()
            .map(|id| (id.clone(), Self::lookup(&state, id)))
            .collect())
    }

    async fn list(
        &self,
        query: &str,
        _fields: &str,
        order_by: Option<&str>,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        self.inner.calls.list.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let state = self.inner.state.lock();
        let mut files: Vec<RemoteFile> = state
            .files
            .values()
            .filter(|file| query_matches(file, query))
            .cloned()
            .collect();
        match order_by {
            Some(order) if order.starts_with("name") => {
                files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)))
            }
            _ => files.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        Ok(files)
    }

    async fn create(
        &self,
        metadata: &NewFile,
        content: Option<&[u8]>,
    ) -> Result<RemoteFile, RemoteError> {
        self.inner.calls.mutation.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let mut state = self.inner.state.lock();
        state.next_id += 1;
        let mut file = RemoteFile::from_new(format!("mock-{}", state.next_id), metadata);
        if let Some(content) = content {
            file.checksum = Some(checksum_of(content));
            file.size = Some(content.len() as u64);
            state.media.insert(file.id.clone(), content.to_vec());
        }
        state.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn update_metadata(
        &self,
        id: &str,
        patch: &MetadataPatch,
    ) -> Result<RemoteFile, RemoteError> {
        self.inner.calls.mutation.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let mut state = self.inner.state.lock();
        let file = Self::lookup_mut(&mut state, id)?;
        file.apply_patch(patch);
        Ok(file.clone())
    }

    async fn update_media(
        &self,
        id: &str,
        bytes: &[u8],
        metadata: Option<&MetadataPatch>,
    ) -> Result<RemoteFile, RemoteError> {
        self.inner.calls.mutation.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let mut state = self.inner.state.lock();
        let file = Self::lookup_mut(&mut state, id)?;
        if let Some(patch) = metadata {
            file.apply_patch(patch);
        }
        file.checksum = Some(checksum_of(bytes));
        file.size = Some(bytes.len() as u64);
        let updated = file.clone();
        state.media.insert(id.to_string(), bytes.to_vec());
        state.reported_checksums.remove(id);
        Ok(updated)
    }

    async fn download_media(&self, id: &str) -> Result<DownloadedMedia, RemoteError> {
        self.inner.calls.download.fetch_add(1, Ordering::SeqCst);
        self.inner.state.lock().download_log.push(id.to_string());
        self.enter().await?;

        let state = self.inner.state.lock();
        let file = Self::lookup(&state, id)?;
        let bytes = state.media.get(id).cloned().unwrap_or_default();
        let checksum = state
            .reported_checksums
            .get(id)
            .cloned()
            .or(file.checksum);
        Ok(DownloadedMedia { bytes, checksum })
    }

    async fn delete(&self, id: &str, restore: bool) -> Result<(), RemoteError> {
        self.inner.calls.mutation.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let mut state = self.inner.state.lock();
        Self::lookup_mut(&mut state, id)?.trashed = !restore;
        Ok(())
    }
}
