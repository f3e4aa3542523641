//! Environment variable parsing utilities.
//!
//! Every tunable in the workspace is read through these helpers so that
//! parsing rules (truthy values, list splitting, defaults) stay in one place.
//!
//! ```
//! use canvas_types::env_utils::{env_bool, env_var_or};
//!
//! let window_ms: i64 = env_var_or("CANVAS_RECENT_WINDOW_MS", 60_000);
//! let memory_only = env_bool("CANVAS_DISABLE_DURABLE");
//! # let _ = (window_ms, memory_only);
//! ```

use std::str::FromStr;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable, falling back to `default`.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Check if an environment variable is set to a truthy value
/// ("1", "true", "yes" or "on", case-insensitive).
pub fn env_bool(key: &str) -> bool {
    std::env::var(key).map(|v| is_truthy(&v)).unwrap_or(false)
}

/// Get an environment variable as a string with a default value.
pub fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
