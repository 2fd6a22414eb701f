//! Counters for the cache read paths.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache counters, shared by the read paths and their background rebuilds.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Reads served from a fresh entry
    pub fresh_hits: AtomicU64,

    /// Reads served from a stale entry
    pub stale_hits: AtomicU64,

    /// Reads that had to compute synchronously
    pub misses: AtomicU64,

    /// Background rebuilds scheduled after a stale hit
    pub background_rebuilds: AtomicU64,

    /// Background rebuilds that failed and left the entry as it was
    pub rebuild_failures: AtomicU64,

    /// Cache-layer errors absorbed by falling back to the store
    pub degraded_cache_errors: AtomicU64,

    /// Entries removed by tag invalidation
    pub invalidated_entries: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current snapshot of all counters.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            background_rebuilds: self.background_rebuilds.load(Ordering::Relaxed),
            rebuild_failures: self.rebuild_failures.load(Ordering::Relaxed),
            degraded_cache_errors: self.degraded_cache_errors.load(Ordering::Relaxed),
            invalidated_entries: self.invalidated_entries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub fresh_hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub background_rebuilds: u64,
    pub rebuild_failures: u64,
    pub degraded_cache_errors: u64,
    pub invalidated_entries: u64,
}

impl CacheMetricsSnapshot {
    /// Fraction of reads served from cache, fresh or stale.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.fresh_hits + self.stale_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = CacheMetrics::new();
        CacheMetrics::incr(&metrics.fresh_hits);
        CacheMetrics::incr(&metrics.stale_hits);
        CacheMetrics::incr(&metrics.misses);
        CacheMetrics::add(&metrics.invalidated_entries, 4);
        let snap = metrics.snapshot();
        assert_eq!(snap.fresh_hits, 1);
        assert_eq!(snap.invalidated_entries, 4);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheMetricsSnapshot::default().hit_rate(), 0.0);
    }
}
