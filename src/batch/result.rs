//! Outcome of a processing run.

use crate::telemetry::PerformanceSummary;
use crate::types::CompletionResponse;
use serde::Serialize;
use std::time::Duration;

/// Where a completed task's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Remote,
    Cache,
    /// A near-duplicate entry found by the similarity index.
    Similarity,
}

impl ResultSource {
    pub fn is_cached(&self) -> bool {
        !matches!(self, ResultSource::Remote)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTask {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub result: CompletionResponse,
    pub elapsed: Duration,
    pub retries_used: u32,
    pub source: ResultSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTask {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub error: String,
    pub retries_used: u32,
}

/// Every scheduled task id appears in exactly one of `completed` or `failed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingResult {
    /// Correlates this run's log records.
    pub run_id: String,
    pub completed: Vec<CompletedTask>,
    pub failed: Vec<FailedTask>,
    pub total_tokens: u64,
    /// Remote spend for this run; cache hits add nothing.
    pub total_cost: f64,
    pub total_elapsed: Duration,
    pub performance: PerformanceSummary,
}

impl ProcessingResult {
    pub fn task_count(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn completed_task(&self, task_id: &str) -> Option<&CompletedTask> {
        self.completed.iter().find(|t| t.task_id == task_id)
    }

    pub fn failed_task(&self, task_id: &str) -> Option<&FailedTask> {
        self.failed.iter().find(|t| t.task_id == task_id)
    }

    /// Completed sub-results of a split document, in chunk order.
    pub fn chunks_of(&self, parent_id: &str) -> Vec<&CompletedTask> {
        let mut chunks: Vec<&CompletedTask> = self
            .completed
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .collect();
        chunks.sort_by_key(|t| chunk_ordinal(&t.task_id));
        chunks
    }
}

fn chunk_ordinal(task_id: &str) -> usize {
    task_id
        .rsplit_once("#chunk-")
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}
