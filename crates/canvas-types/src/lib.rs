//! Shared types for the canvas-sync workspace.
//!
//! - [`FileRecord`] / [`MediaObject`]: what the cache layer stores
//! - [`RetrievalStrategy`]: how a read may use the caches
//! - [`Notifier`]: sink for non-fatal conditions such as a missing durable store
//! - [`env_utils`]: environment-driven configuration helpers

pub mod env_utils;
pub mod file;
pub mod media;
pub mod notify;
pub mod strategy;

pub use env_utils::{env_bool, env_string_or, env_var, env_var_or};
pub use file::{Capabilities, FileMetadata, FileRecord, MetadataPatch, NewFile, ResourceId};
pub use media::MediaObject;
pub use notify::{Notice, Notifier, RecordingNotifier, TracingNotifier};
pub use strategy::{RetrievalStrategy, DEFAULT_RECENT_WINDOW_MS};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
