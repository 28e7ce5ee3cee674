//! Cache statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_bytes: usize,
    pub oldest_entry_age: Duration,
    pub newest_entry_age: Duration,
    pub average_access_count: f64,
    pub estimated_cost_savings: f64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub similarity_hits: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) sets: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) expirations: AtomicU64,
    pub(crate) similarity_hits: AtomicU64,
    pub(crate) errors: AtomicU64,
}

impl AtomicStats {
    pub(crate) fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.hit_rate = CacheStats::hit_ratio(stats.hits, stats.misses);
        stats.sets = self.sets.load(Ordering::Relaxed);
        stats.evictions = self.evictions.load(Ordering::Relaxed);
        stats.expirations = self.expirations.load(Ordering::Relaxed);
        stats.similarity_hits = self.similarity_hits.load(Ordering::Relaxed);
        stats.errors = self.errors.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        assert_eq!(CacheStats::hit_ratio(0, 0), 0.0);
        assert_eq!(CacheStats::hit_ratio(3, 1), 0.75);
    }

    #[test]
    fn test_fill_copies_counters() {
        let atomics = AtomicStats::default();
        AtomicStats::bump(&atomics.hits, 2);
        AtomicStats::bump(&atomics.misses, 2);
        AtomicStats::bump(&atomics.evictions, 5);
        let mut stats = CacheStats::default();
        atomics.fill(&mut stats);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.evictions, 5);
    }
}
