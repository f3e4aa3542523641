//! canvas-sync: remote resource cache and synchronization layer.
//!
//! Every read of a remote file decides between memory, the durable local
//! cache and the network according to a [`RetrievalStrategy`], with at most
//! one in-flight network operation per file id. File content is cached by
//! checksum so it always matches the metadata it was fetched for.
//!
//! - [`SyncSession`]: the per-session facade wiring all components together
//! - [`SyncConfig`]: environment-driven configuration
//! - [`logging`]: subscriber setup for binaries
//!
//! The building blocks live in the workspace crates re-exported below.

pub mod config;
pub mod logging;
pub mod session;

pub use canvas_durable_cache as durable;
pub use canvas_fetcher as fetcher;
pub use canvas_transport as transport;
pub use canvas_types as types;

pub use canvas_fetcher::{SyncError, SyncResult};
pub use canvas_types::{FileRecord, MediaObject, MetadataPatch, NewFile, RetrievalStrategy};
pub use config::SyncConfig;
pub use session::{CacheInfo, SyncSession};
