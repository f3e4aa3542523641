//! Filesystem-backed durable cache for canvas-sync.
//!
//! This crate provides:
//! - `DurableStore`: schema-versioned, sharded storage for file records and media
//! - `schema`: monotonic schema versions with per-version upgrade steps
//! - `CacheMetrics`: counters shared by the cache coordinators

pub mod metrics;
pub mod paths;
pub mod schema;
pub mod store;

pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use schema::{
    canvas_upgrade, SchemaState, SchemaUpgrade, CURRENT_SCHEMA_VERSION, FILES_COLLECTION,
    MEDIA_COLLECTION,
};
pub use store::{CacheStats, CollectionStats, DurableStore, MediaMeta};
