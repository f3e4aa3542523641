//! Session behaviour with and without a durable cache.

mod common;

use canvas_sync::durable::CURRENT_SCHEMA_VERSION;
use canvas_sync::transport::MockRemoteClient;
use canvas_sync::types::{Notice, RecordingNotifier};
use canvas_sync::RetrievalStrategy;
use common::*;
use tempfile::TempDir;

#[tokio::test]
async fn test_records_and_media_survive_a_new_session() {
    let dir = TempDir::new().unwrap();
    let notifier = RecordingNotifier::new();

    let remote = remote_with(&["a", "img"]);
    {
        let session = durable_session(&remote, dir.path(), &notifier).await;
        assert!(session.durable().is_available());
        session
            .get_files(&ids(&["a", "img"]), RetrievalStrategy::Lazy)
            .await
            .unwrap();
        session
            .download_media("img", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
            .await
            .unwrap();
        session.shutdown();
    }

    // A fresh remote with nothing in it: everything must come from disk.
    let empty = MockRemoteClient::new();
    let session = durable_session(&empty, dir.path(), &notifier).await;
    assert_eq!(session.durable().schema_version(), Some(CURRENT_SCHEMA_VERSION));

    let records = session
        .get_files(&ids(&["a", "img"]), RetrievalStrategy::CacheOnly)
        .await
        .unwrap();
    assert_eq!(record_ids(&records), ids(&["a", "img"]));
    assert_eq!(session.metrics().durable_hits, 2);

    let media = session
        .download_media("img", RetrievalStrategy::CacheOnly, RetrievalStrategy::CacheOnly)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media.payload, b"payload-img".to_vec());
    assert_eq!(session.metrics().media_durable_hits, 1);
    assert_eq!(empty.total_calls(), 0);
    assert!(notifier.notices().is_empty());
}

#[tokio::test]
async fn test_durable_hits_are_promoted_to_memory() {
    let dir = TempDir::new().unwrap();
    let notifier = RecordingNotifier::new();
    let remote = remote_with(&["a"]);
    durable_session(&remote, dir.path(), &notifier)
        .await
        .get_file("a", RetrievalStrategy::Lazy)
        .await
        .unwrap();

    let session = durable_session(&remote, dir.path(), &notifier).await;
    assert!(!session.memory().has_file("a"));
    session
        .get_file("a", RetrievalStrategy::OptimisticCache)
        .await
        .unwrap();
    assert!(session.memory().has_file("a"));

    // Passive only looks at memory, which now has it.
    assert!(session
        .get_file("a", RetrievalStrategy::Passive)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_unusable_cache_dir_notifies_once_and_reads_still_work() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"occupied").unwrap();
    let notifier = RecordingNotifier::new();

    let remote = remote_with(&["a"]);
    let session = durable_session(&remote, &blocker, &notifier).await;
    assert!(!session.durable().is_available());

    let record = session.get_file("a", RetrievalStrategy::Lazy).await.unwrap();
    assert!(record.is_some());
    let media = session
        .download_media("a", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
        .await
        .unwrap();
    assert!(media.is_some());

    let notices = notifier.notices();
    assert_eq!(notices.len(), 1);
    assert!(matches!(notices[0], Notice::PersistenceUnavailable { .. }));
    assert_eq!(session.metrics().durable_write_failures, 0);
}

#[tokio::test]
async fn test_memory_only_session_reports_disabled_store() {
    let remote = remote_with(&["a"]);
    let session = memory_session(&remote).await;

    let info = session.cache_info().await.unwrap();
    assert!(!info.durable.available);
    assert!(info.durable.unavailable_reason.is_some());
    assert_eq!(info.memory_files, 0);

    session.get_file("a", RetrievalStrategy::Lazy).await.unwrap();
    let info = session.cache_info().await.unwrap();
    assert_eq!(info.memory_files, 1);
    assert_eq!(info.metrics.remote_batches, 1);
}

#[tokio::test]
async fn test_cache_info_counts_durable_records() {
    let dir = TempDir::new().unwrap();
    let notifier = RecordingNotifier::new();
    let remote = remote_with(&["a", "b"]);
    let session = durable_session(&remote, dir.path(), &notifier).await;
    session
        .get_files(&ids(&["a", "b"]), RetrievalStrategy::Lazy)
        .await
        .unwrap();
    session
        .download_media("a", RetrievalStrategy::Lazy, RetrievalStrategy::Lazy)
        .await
        .unwrap();

    let info = session.cache_info().await.unwrap();
    assert!(info.durable.available);
    assert_eq!(info.durable.collections["files"].records, 2);
    assert_eq!(info.durable.collections["media"].records, 1);
    assert_eq!(info.memory_media, 1);
}

#[tokio::test]
async fn test_failed_durable_write_is_counted_and_the_read_succeeds() {
    let dir = TempDir::new().unwrap();
    let notifier = RecordingNotifier::new();
    let remote = remote_with(&["a"]);
    let session = durable_session(&remote, dir.path(), &notifier).await;
    assert!(session.durable().is_available());

    // The store opened fine; now its files collection cannot be written.
    let files_dir = dir.path().join("files");
    std::fs::remove_dir_all(&files_dir).unwrap();
    std::fs::write(&files_dir, b"not a directory").unwrap();

    let records = session
        .get_files(&ids(&["a"]), RetrievalStrategy::Lazy)
        .await
        .unwrap();

    assert_eq!(record_ids(&records), ids(&["a"]));
    assert!(session.memory().has_file("a"));
    assert_eq!(session.metrics().durable_write_failures, 1);
    assert!(notifier.notices().is_empty());
}
