//! Metrics and reporting for cache operations.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache operation metrics (thread-safe counters).
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    /// Records served from the memory registry
    pub memory_hits: Arc<AtomicU64>,
    /// Records served from the durable store
    pub durable_hits: Arc<AtomicU64>,
    /// Batched metadata round trips issued
    pub remote_batches: Arc<AtomicU64>,
    /// Ids requested across all batches
    pub remote_items: Arc<AtomicU64>,
    /// Requests that joined an already pending operation
    pub dedup_joins: Arc<AtomicU64>,
    /// Media served from memory
    pub media_memory_hits: Arc<AtomicU64>,
    /// Media served from the durable store
    pub media_durable_hits: Arc<AtomicU64>,
    /// Media downloads issued
    pub media_downloads: Arc<AtomicU64>,
    /// Empty media synthesized for zero-byte files
    pub zero_byte_stubs: Arc<AtomicU64>,
    /// Durable writes that failed and were absorbed
    pub durable_write_failures: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn record_memory_hits(&self, count: u64) {
        self.memory_hits.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_durable_hits(&self, count: u64) {
        self.durable_hits.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one remote batch carrying `items` ids.
    pub fn record_remote_batch(&self, items: u64) {
        self.remote_batches.fetch_add(1, Ordering::Relaxed);
        self.remote_items.fetch_add(items, Ordering::Relaxed);
    }

    pub fn record_dedup_joins(&self, count: u64) {
        self.dedup_joins.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_media_memory_hit(&self) {
        self.media_memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_media_durable_hit(&self) {
        self.media_durable_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_media_download(&self) {
        self.media_downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zero_byte_stub(&self) {
        self.zero_byte_stubs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_durable_write_failure(&self) {
        self.durable_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            remote_batches: self.remote_batches.load(Ordering::Relaxed),
            remote_items: self.remote_items.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
            media_memory_hits: self.media_memory_hits.load(Ordering::Relaxed),
            media_durable_hits: self.media_durable_hits.load(Ordering::Relaxed),
            media_downloads: self.media_downloads.load(Ordering::Relaxed),
            zero_byte_stubs: self.zero_byte_stubs.load(Ordering::Relaxed),
            durable_write_failures: self.durable_write_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.memory_hits,
            &self.durable_hits,
            &self.remote_batches,
            &self.remote_items,
            &self.dedup_joins,
            &self.media_memory_hits,
            &self.media_durable_hits,
            &self.media_downloads,
            &self.zero_byte_stubs,
            &self.durable_write_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of metrics (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub remote_batches: u64,
    pub remote_items: u64,
    pub dedup_joins: u64,
    pub media_memory_hits: u64,
    pub media_durable_hits: u64,
    pub media_downloads: u64,
    pub zero_byte_stubs: u64,
    pub durable_write_failures: u64,
}

impl MetricsSnapshot {
    /// Metadata lookups answered from either cache.
    pub fn cached_lookups(&self) -> u64 {
        self.memory_hits + self.durable_hits
    }

    /// Share of metadata lookups that avoided the network.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cached_lookups() + self.remote_items;
        if total == 0 {
            return 0.0;
        }
        self.cached_lookups() as f64 / total as f64
    }

    /// Average ids per remote batch.
    pub fn average_batch_size(&self) -> f64 {
        if self.remote_batches == 0 {
            return 0.0;
        }
        self.remote_items as f64 / self.remote_batches as f64
    }

    pub fn media_hit_rate(&self) -> f64 {
        let hits = self.media_memory_hits + self.media_durable_hits + self.zero_byte_stubs;
        let total = hits + self.media_downloads;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Format a human-readable report.
    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Cache Metrics Report".to_string());
        lines.push("=".repeat(50));
        lines.push("File Metadata:".to_string());
        lines.push(format!("  Memory Cache:    {}", self.memory_hits));
        lines.push(format!("  Durable Cache:   {}", self.durable_hits));
        lines.push(format!("  Remote Items:    {}", self.remote_items));
        lines.push(format!("  Remote Batches:  {}", self.remote_batches));
        lines.push(format!("  Avg Batch Size:  {:.1}", self.average_batch_size()));
        lines.push(format!("  Dedup Joins:     {}", self.dedup_joins));
        lines.push(format!(
            "  Cache Hit Rate:  {:.1}%",
            self.cache_hit_rate() * 100.0
        ));
        lines.push(String::new());
        lines.push("Media:".to_string());
        lines.push(format!("  Memory Cache:    {}", self.media_memory_hits));
        lines.push(format!("  Durable Cache:   {}", self.media_durable_hits));
        lines.push(format!("  Zero-byte Stubs: {}", self.zero_byte_stubs));
        lines.push(format!("  Downloads:       {}", self.media_downloads));
        lines.push(format!(
            "  Hit Rate:        {:.1}%",
            self.media_hit_rate() * 100.0
        ));
        if self.durable_write_failures > 0 {
            lines.push(String::new());
            lines.push(format!(
                "Durable write failures: {}",
                self.durable_write_failures
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = CacheMetrics::default();
        metrics.record_memory_hits(3);
        metrics.record_durable_hits(1);
        metrics.record_remote_batch(4);
        metrics.record_remote_batch(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cached_lookups(), 4);
        assert_eq!(snapshot.remote_batches, 2);
        assert_eq!(snapshot.remote_items, 6);
        assert!((snapshot.cache_hit_rate() - 0.4).abs() < 1e-9);
        assert!((snapshot.average_batch_size() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CacheMetrics::default();
        let clone = metrics.clone();
        clone.record_media_download();
        assert_eq!(metrics.snapshot().media_downloads, 1);

        metrics.reset();
        assert_eq!(clone.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_format_report() {
        let metrics = CacheMetrics::default();
        metrics.record_zero_byte_stub();
        metrics.record_durable_write_failure();
        let report = metrics.snapshot().format_report();
        assert!(report.contains("Cache Metrics Report"));
        assert!(report.contains("Zero-byte Stubs: 1"));
        assert!(report.contains("Durable write failures: 1"));
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.cache_hit_rate(), 0.0);
        assert_eq!(snapshot.media_hit_rate(), 0.0);
        assert!(!snapshot.format_report().contains("Durable write failures"));
    }
}
