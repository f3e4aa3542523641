//! Transport layer for the remote file store.
//!
//! - [`RemoteClient`]: async trait the cache layer programs against
//! - [`HttpRemoteClient`]: REST implementation with multipart batching
//! - [`MockRemoteClient`]: in-memory implementation for tests
//! - [`RemoteError`]: failures classified at the transport boundary

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod multipart;

pub use auth::{AuthorizedAgent, StaticToken, TokenProvider};
pub use client::{BatchResults, DownloadedMedia, RemoteClient, RemoteFile, DEFAULT_FILE_FIELDS};
pub use error::RemoteError;
pub use http::{HttpRemoteClient, DEFAULT_BATCH_LIMIT, DEFAULT_ENDPOINT};
pub use mock::{checksum_of, MockRemoteClient};
