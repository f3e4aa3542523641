//! Coordinator tuning.

use std::time::Duration;

use canvas_transport::DEFAULT_FILE_FIELDS;
use canvas_types::{env_string_or, env_var_or, DEFAULT_RECENT_WINDOW_MS};

/// Default per-call remote timeout.
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Maximum age of a record served under the `Recent` strategy.
    pub recent_window_ms: i64,
    /// Upper bound on any single remote call.
    pub remote_timeout: Duration,
    /// Field mask requested for file metadata.
    pub fields: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            recent_window_ms: DEFAULT_RECENT_WINDOW_MS,
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            fields: DEFAULT_FILE_FIELDS.to_string(),
        }
    }
}

impl FetcherConfig {
    /// Defaults overridden by `CANVAS_RECENT_WINDOW_MS`,
    /// `CANVAS_REMOTE_TIMEOUT_SECS` and `CANVAS_FILE_FIELDS`.
    pub fn from_env() -> Self {
        Self {
            recent_window_ms: env_var_or("CANVAS_RECENT_WINDOW_MS", DEFAULT_RECENT_WINDOW_MS),
            remote_timeout: Duration::from_secs(env_var_or(
                "CANVAS_REMOTE_TIMEOUT_SECS",
                DEFAULT_REMOTE_TIMEOUT_SECS,
            )),
            fields: env_string_or("CANVAS_FILE_FIELDS", DEFAULT_FILE_FIELDS),
        }
    }

    pub fn with_recent_window_ms(mut self, window_ms: i64) -> Self {
        self.recent_window_ms = window_ms;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("CANVAS_RECENT_WINDOW_MS", "5000");
        std::env::set_var("CANVAS_REMOTE_TIMEOUT_SECS", "2");
        let config = FetcherConfig::from_env();
        std::env::remove_var("CANVAS_RECENT_WINDOW_MS");
        std::env::remove_var("CANVAS_REMOTE_TIMEOUT_SECS");

        assert_eq!(config.recent_window_ms, 5000);
        assert_eq!(config.remote_timeout, Duration::from_secs(2));
        assert_eq!(config.fields, DEFAULT_FILE_FIELDS);
    }

    #[test]
    fn test_builders() {
        let config = FetcherConfig::default()
            .with_recent_window_ms(1)
            .with_remote_timeout(Duration::from_millis(5));
        assert_eq!(config.recent_window_ms, 1);
        assert_eq!(config.remote_timeout, Duration::from_millis(5));
    }
}
