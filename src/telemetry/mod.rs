//! 遥测模块：缓存与批处理的指标事件及运行性能汇总。
//!
//! # Telemetry Module
//!
//! The engine reports what it does through a [`MetricsSink`]; applications
//! decide where those events go. Nothing is collected unless a sink is
//! injected; the default is [`NoopMetricsSink`].
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MetricEvent`] | Typed metric event enum |
//! | [`MetricsSink`] | Trait for metric destinations |
//! | [`NoopMetricsSink`] | Default no-op sink |
//! | [`InMemoryMetricsSink`] | Bounded in-memory sink for tests and dashboards |
//! | [`TracingMetricsSink`] | Emits events as `tracing` records |
//! | [`CompositeMetricsSink`] | Multi-destination composite sink |
//! | [`PerformanceAggregator`] | Throughput / latency / utilization for a run |

mod performance;

pub use performance::{PerformanceAggregator, PerformanceSummary};

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Capacity,
    Expired,
    Invalidated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricEvent {
    CacheHit {
        key: String,
        cost_saved: f64,
        /// Set when the hit came from the similarity path.
        similarity: Option<f64>,
    },
    CacheMiss {
        key: String,
    },
    CacheRemoved {
        count: usize,
        reason: RemovalReason,
    },
    TaskCompleted {
        task_id: String,
        elapsed: Duration,
        retries_used: u32,
        from_cache: bool,
    },
    TaskFailed {
        task_id: String,
        error: String,
        retries_used: u32,
    },
    BatchFinished {
        batch: usize,
        size: usize,
        elapsed: Duration,
    },
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricEvent);
}

pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _event: &MetricEvent) {}
}

pub fn noop_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetricsSink)
}

/// In-memory sink keeping the most recent `max_events` events.
pub struct InMemoryMetricsSink {
    events: Mutex<VecDeque<MetricEvent>>,
    max_events: usize,
}

impl InMemoryMetricsSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        match self.events.lock() {
            Ok(events) => events.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn count_where(&self, pred: impl Fn(&MetricEvent) -> bool) -> usize {
        match self.events.lock() {
            Ok(events) => events.iter().filter(|e| pred(e)).count(),
            Err(_) => 0,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record(&self, event: &MetricEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push_back(event.clone());
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }
}

/// Logs every event at debug level.
#[derive(Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, event: &MetricEvent) {
        match event {
            MetricEvent::CacheHit {
                key,
                cost_saved,
                similarity,
            } => tracing::debug!(key = key.as_str(), cost_saved, ?similarity, "cache hit"),
            MetricEvent::CacheMiss { key } => tracing::debug!(key = key.as_str(), "cache miss"),
            MetricEvent::CacheRemoved { count, reason } => {
                tracing::debug!(count, ?reason, "cache entries removed")
            }
            MetricEvent::TaskCompleted {
                task_id,
                elapsed,
                retries_used,
                from_cache,
            } => tracing::debug!(
                task_id = task_id.as_str(),
                duration_ms = elapsed.as_millis() as u64,
                retries_used,
                from_cache,
                "task completed"
            ),
            MetricEvent::TaskFailed {
                task_id,
                error,
                retries_used,
            } => tracing::debug!(
                task_id = task_id.as_str(),
                error = error.as_str(),
                retries_used,
                "task failed"
            ),
            MetricEvent::BatchFinished {
                batch,
                size,
                elapsed,
            } => tracing::debug!(
                batch,
                size,
                duration_ms = elapsed.as_millis() as u64,
                "batch finished"
            ),
        }
    }
}

/// Composite sink for multiple destinations.
#[derive(Default)]
pub struct CompositeMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl CompositeMetricsSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }
    pub fn add_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for CompositeMetricsSink {
    fn record(&self, event: &MetricEvent) {
        for s in &self.sinks {
            s.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn miss(k: &str) -> MetricEvent {
        MetricEvent::CacheMiss { key: k.to_string() }
    }

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryMetricsSink::new(2);
        sink.record(&miss("a"));
        sink.record(&miss("b"));
        sink.record(&miss("c"));
        assert_eq!(sink.events(), vec![miss("b"), miss("c")]);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(InMemoryMetricsSink::new(10));
        let b = Arc::new(InMemoryMetricsSink::new(10));
        let composite = CompositeMetricsSink::new()
            .add_sink(a.clone())
            .add_sink(b.clone())
            .add_sink(Arc::new(TracingMetricsSink));
        composite.record(&miss("k"));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(MetricEvent::CacheRemoved {
            count: 3,
            reason: RemovalReason::Capacity,
        })
        .unwrap();
        assert_eq!(json["type"], "cache_removed");
        assert_eq!(json["reason"], "capacity");
    }
}
