#![allow(dead_code)]
//! Shared helpers for the canvas-sync integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use canvas_sync::fetcher::FetcherConfig;
use canvas_sync::transport::{MockRemoteClient, RemoteFile};
use canvas_sync::types::{FileMetadata, FileRecord, RecordingNotifier};
use canvas_sync::{SyncConfig, SyncSession};

/// A remote file with a name and, when given, content checksum and size.
pub fn remote_file(id: &str) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: Some(format!("{}.png", id)),
        mime_type: Some("image/png".to_string()),
        ..RemoteFile::default()
    }
}

/// A remote populated with `ids`, each with a small payload.
pub fn remote_with(ids: &[&str]) -> MockRemoteClient {
    let remote = MockRemoteClient::new();
    for id in ids {
        remote.add_file(remote_file(id));
        remote.add_media(id, format!("payload-{}", id).into_bytes());
    }
    remote
}

/// A cache record as if loaded `age_ms` before `now`.
pub fn cached_record(id: &str, now: i64, age_ms: i64) -> FileRecord {
    FileRecord::new(
        id,
        FileMetadata {
            name: Some(format!("{}.png", id)),
            checksum: Some(format!("cached-{}", id)),
            size: Some(4),
            ..FileMetadata::default()
        },
        now - age_ms,
    )
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn record_ids(records: &[FileRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Memory-only session over `remote`.
pub async fn memory_session(remote: &MockRemoteClient) -> SyncSession {
    memory_session_with(remote, FetcherConfig::default()).await
}

pub async fn memory_session_with(remote: &MockRemoteClient, fetcher: FetcherConfig) -> SyncSession {
    SyncSession::open(
        SyncConfig::memory_only().with_fetcher(fetcher),
        Arc::new(remote.clone()),
        Arc::new(RecordingNotifier::new()),
    )
    .await
}

/// Session with a durable cache rooted at `dir`.
pub async fn durable_session(
    remote: &MockRemoteClient,
    dir: &Path,
    notifier: &RecordingNotifier,
) -> SyncSession {
    SyncSession::open(
        SyncConfig::memory_only().with_cache_dir(dir),
        Arc::new(remote.clone()),
        Arc::new(notifier.clone()),
    )
    .await
}

/// Give spawned tasks a chance to reach their first await point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
