//! Cache coordinators for canvas-sync.
//!
//! This crate provides:
//! - `FileAccessCoordinator`: metadata reads and writes driven by a `RetrievalStrategy`
//! - `MediaAccessCoordinator`: content downloads cached by checksum
//! - `MemoryRegistry`: the process-local tier both coordinators share
//! - `RequestDeduplicator`: at most one in-flight remote operation per id
//!
//! Lookups walk memory, then durable storage, then the remote, as the
//! strategy allows. Every remote call is bounded by a timeout and by the
//! session's `ShutdownSignal`.

pub mod config;
pub mod dedup;
pub mod error;
pub mod files;
pub mod guard;
pub mod media;
pub mod memory;

pub use config::{FetcherConfig, DEFAULT_REMOTE_TIMEOUT_SECS};
pub use dedup::{Claim, OpToken, PendingRelease, RequestDeduplicator, SharedOp};
pub use error::{SyncError, SyncResult};
pub use files::{BatchOutcome, FileAccessCoordinator, ItemOutcome, RemoteMutation};
pub use guard::{LoadingGuard, RemoteCallGuard, ShutdownSignal};
pub use media::MediaAccessCoordinator;
pub use memory::MemoryRegistry;
