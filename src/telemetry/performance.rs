//! Per-run performance aggregation.

use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub throughput_per_second: f64,
    pub average_latency: Duration,
    /// Fraction of the theoretical `max_concurrency × wall clock` budget actually spent working.
    pub concurrency_utilization: f64,
    pub completed: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub remote_calls: usize,
    pub retries: u64,
    pub batches: usize,
}

/// Accumulates outcomes while a run is in progress.
#[derive(Debug, Clone, Default)]
pub struct PerformanceAggregator {
    latencies: Vec<Duration>,
    failed: usize,
    cache_hits: usize,
    remote_calls: usize,
    retries: u64,
    batches: usize,
    total_tokens: u64,
    total_cost: f64,
}

impl PerformanceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(
        &mut self,
        elapsed: Duration,
        tokens: u64,
        cost: f64,
        attempts: u32,
        from_cache: bool,
    ) {
        self.latencies.push(elapsed);
        self.total_tokens += tokens;
        if from_cache {
            self.cache_hits += 1;
        } else {
            self.total_cost += cost;
            self.remote_calls += attempts as usize;
            self.retries += attempts.saturating_sub(1) as u64;
        }
    }

    pub fn record_failed(&mut self, attempts: u32) {
        self.failed += 1;
        self.remote_calls += attempts as usize;
        self.retries += attempts.saturating_sub(1) as u64;
    }

    pub fn record_batch(&mut self) {
        self.batches += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Spend on remote calls only; cache hits cost nothing.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn summarize(&self, total_elapsed: Duration, max_concurrency: usize) -> PerformanceSummary {
        let completed = self.latencies.len();
        let secs = total_elapsed.as_secs_f64();
        let busy: Duration = self.latencies.iter().sum();

        let throughput_per_second = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };
        let average_latency = if completed > 0 {
            busy / completed as u32
        } else {
            Duration::ZERO
        };
        let concurrency_utilization = if secs > 0.0 && max_concurrency > 0 {
            (busy.as_secs_f64() / max_concurrency as f64 / secs).min(1.0)
        } else {
            0.0
        };

        PerformanceSummary {
            throughput_per_second,
            average_latency,
            concurrency_utilization,
            completed,
            failed: self.failed,
            cache_hits: self.cache_hits,
            remote_calls: self.remote_calls,
            retries: self.retries,
            batches: self.batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_formulas() {
        let mut agg = PerformanceAggregator::new();
        agg.record_completed(Duration::from_secs(2), 100, 0.02, 1, false);
        agg.record_completed(Duration::from_secs(4), 50, 0.01, 3, false);
        agg.record_completed(Duration::from_secs(0), 10, 0.5, 0, true);
        agg.record_failed(2);
        agg.record_batch();

        let s = agg.summarize(Duration::from_secs(4), 2);
        assert_eq!(s.completed, 3);
        assert_eq!(s.failed, 1);
        assert!((s.throughput_per_second - 0.75).abs() < 1e-9);
        assert_eq!(s.average_latency, Duration::from_secs(2));
        // 6s busy / 2 slots / 4s wall
        assert!((s.concurrency_utilization - 0.75).abs() < 1e-9);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.remote_calls, 6);
        assert_eq!(s.retries, 3);
        assert_eq!(s.batches, 1);
        assert_eq!(agg.total_tokens(), 160);
        assert!((agg.total_cost() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_utilization_is_capped() {
        let mut agg = PerformanceAggregator::new();
        agg.record_completed(Duration::from_secs(10), 0, 0.0, 1, false);
        let s = agg.summarize(Duration::from_secs(1), 1);
        assert_eq!(s.concurrency_utilization, 1.0);
    }

    #[test]
    fn test_empty_run() {
        let s = PerformanceAggregator::new().summarize(Duration::ZERO, 3);
        assert_eq!(s.throughput_per_second, 0.0);
        assert_eq!(s.average_latency, Duration::ZERO);
        assert_eq!(s.concurrency_utilization, 0.0);
    }
}
