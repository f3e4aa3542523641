//! Session configuration.
//!
//! Everything has a default; `SyncConfig::from_env()` applies the `CANVAS_*`
//! environment overrides and the CLI layers its flags on top.

use std::path::PathBuf;

use canvas_fetcher::FetcherConfig;
use canvas_transport::{DEFAULT_BATCH_LIMIT, DEFAULT_ENDPOINT};
use canvas_types::{env_bool, env_string_or, env_var, env_var_or};

/// Default cache root: `~/.canvas-sync/cache`.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".canvas-sync")
        .join("cache")
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the durable cache. `None` runs memory-only.
    pub cache_dir: Option<PathBuf>,
    /// Base URL of the remote file API.
    pub endpoint: String,
    /// Items per multipart batch request.
    pub batch_limit: usize,
    /// Static bearer token. Empty means unauthenticated requests fail with
    /// `Unauthorized` before reaching the network.
    pub access_token: String,
    pub fetcher: FetcherConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_dir: Some(default_cache_dir()),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            access_token: String::new(),
            fetcher: FetcherConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let cache_dir = if env_bool("CANVAS_DISABLE_DURABLE") {
            None
        } else {
            Some(env_var::<PathBuf>("CANVAS_CACHE_DIR").unwrap_or_else(default_cache_dir))
        };
        Self {
            cache_dir,
            endpoint: env_string_or("CANVAS_API_ENDPOINT", DEFAULT_ENDPOINT),
            batch_limit: env_var_or("CANVAS_BATCH_LIMIT", DEFAULT_BATCH_LIMIT).max(1),
            access_token: env_string_or("CANVAS_ACCESS_TOKEN", ""),
            fetcher: FetcherConfig::from_env(),
        }
    }

    /// Memory-only configuration.
    pub fn memory_only() -> Self {
        Self {
            cache_dir: None,
            ..Self::default()
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn without_durable(mut self) -> Self {
        self.cache_dir = None;
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        std::env::set_var("CANVAS_CACHE_DIR", "/tmp/canvas-sync-config-test");
        std::env::set_var("CANVAS_BATCH_LIMIT", "0");
        std::env::set_var("CANVAS_API_ENDPOINT", "http://localhost:9000");
        let config = SyncConfig::from_env();
        std::env::remove_var("CANVAS_CACHE_DIR");
        std::env::remove_var("CANVAS_BATCH_LIMIT");
        std::env::remove_var("CANVAS_API_ENDPOINT");

        assert_eq!(
            config.cache_dir,
            Some(PathBuf::from("/tmp/canvas-sync-config-test"))
        );
        assert_eq!(config.batch_limit, 1);
        assert_eq!(config.endpoint, "http://localhost:9000");
    }

    #[test]
    fn test_memory_only_and_builders() {
        assert!(SyncConfig::memory_only().cache_dir.is_none());
        let config = SyncConfig::memory_only().with_cache_dir("/x");
        assert_eq!(config.cache_dir, Some(PathBuf::from("/x")));
        assert!(config.without_durable().cache_dir.is_none());
        assert!(default_cache_dir().ends_with(".canvas-sync/cache"));
    }
}
