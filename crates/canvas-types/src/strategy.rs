//! Retrieval strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default staleness window for [`RetrievalStrategy::Recent`].
pub const DEFAULT_RECENT_WINDOW_MS: i64 = 60_000;

/// Named policy controlling cache lookup order and staleness tolerance.
///
/// | Strategy | Cache consulted | On miss |
/// |---|---|---|
/// | `Passive` | memory | nothing, never touches the network |
/// | `OptimisticCache` | memory + durable | cached subset only |
/// | `CacheOnly` | memory + durable | `NotFound` for the missing ids |
/// | `Lazy` | memory + durable | fetch missing |
/// | `Recent` | memory + durable, stale entries ignored | fetch stale or missing |
/// | `Source` | none | fetch everything |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalStrategy {
    Passive,
    OptimisticCache,
    CacheOnly,
    Lazy,
    Recent,
    Source,
}

impl RetrievalStrategy {
    pub const ALL: [RetrievalStrategy; 6] = [
        RetrievalStrategy::Passive,
        RetrievalStrategy::OptimisticCache,
        RetrievalStrategy::CacheOnly,
        RetrievalStrategy::Lazy,
        RetrievalStrategy::Recent,
        RetrievalStrategy::Source,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Passive => "passive",
            RetrievalStrategy::OptimisticCache => "optimistic-cache",
            RetrievalStrategy::CacheOnly => "cache-only",
            RetrievalStrategy::Lazy => "lazy",
            RetrievalStrategy::Recent => "recent",
            RetrievalStrategy::Source => "source",
        }
    }

    pub fn consults_memory(&self) -> bool {
        !matches!(self, RetrievalStrategy::Source)
    }

    pub fn consults_durable(&self) -> bool {
        !matches!(self, RetrievalStrategy::Source | RetrievalStrategy::Passive)
    }

    /// Whether cache misses are fetched from the remote.
    pub fn fetches_missing(&self) -> bool {
        matches!(
            self,
            RetrievalStrategy::Lazy | RetrievalStrategy::Recent | RetrievalStrategy::Source
        )
    }

    /// Maximum age of a usable cache entry, if the strategy bounds it.
    pub fn staleness_window(&self, recent_window_ms: i64) -> Option<i64> {
        match self {
            RetrievalStrategy::Recent => Some(recent_window_ms),
            _ => None,
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        RetrievalStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown strategy '{}' (expected one of: {})",
                    s,
                    RetrievalStrategy::ALL.map(|st| st.as_str()).join(", ")
                )
            })
    }
}
