//! Bounded-parallelism batch scheduler.

use super::result::{CompletedTask, FailedTask, ProcessingResult, ResultSource};
use super::runner::{RetryPolicy, RetryingTaskRunner};
use super::task::{split_large_document, DocumentTask};
use crate::cache::{content_digest, CacheKeyBuilder, CacheMetadata, CacheStore};
use crate::telemetry::{noop_sink, MetricEvent, MetricsSink, PerformanceAggregator};
use crate::tokens::ModelPricing;
use crate::transport::CompletionBackend;
use crate::types::{CompletionRequest, CompletionResponse, SamplingParams};
use crate::{Error, ErrorContext, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub batch_size: usize,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Pause between batches.
    pub batch_delay_ms: u64,
    pub priority_based: bool,
    /// Content longer than this many characters is split into sub-tasks.
    pub chunk_threshold: usize,
    /// Enables the similarity fallback after an exact cache miss.
    pub similarity_threshold: Option<f64>,
    pub provider: String,
    pub model: String,
    pub params: SamplingParams,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            batch_size: 5,
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            batch_delay_ms: 1_000,
            priority_based: true,
            chunk_threshold: 50_000,
            similarity_threshold: None,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            params: SamplingParams::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }
    pub fn with_retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = n;
        self
    }
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay_ms = delay.as_millis() as u64;
        self
    }
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = delay.as_millis() as u64;
        self
    }
    pub fn with_priority_based(mut self, enabled: bool) -> Self {
        self.priority_based = enabled;
        self
    }
    pub fn with_chunk_threshold(mut self, chars: usize) -> Self {
        self.chunk_threshold = chars;
        self
    }
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }
    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }
    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(
            self.retry_max_delay_ms.max(self.retry_base_delay_ms),
        ))
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |field: &str, msg: String| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("scheduler.{}", field))
                    .with_source("scheduler_config"),
            ))
        };
        if self.max_concurrency == 0 {
            return fail("max_concurrency", "max_concurrency must be at least 1".into());
        }
        if self.batch_size == 0 {
            return fail("batch_size", "batch_size must be at least 1".into());
        }
        if self.timeout_ms == 0 {
            return fail("timeout_ms", "timeout_ms must be at least 1".into());
        }
        if self.chunk_threshold == 0 {
            return fail("chunk_threshold", "chunk_threshold must be at least 1".into());
        }
        if let Some(t) = self.similarity_threshold {
            if !(t > 0.0 && t <= 1.0) {
                return fail(
                    "similarity_threshold",
                    format!("similarity_threshold must be in (0, 1], got {}", t),
                );
            }
        }
        if self.model.trim().is_empty() {
            return fail("model", "model must not be empty".into());
        }
        Ok(())
    }
}

enum TaskOutcome {
    Completed(CompletedTask, u32),
    Failed(FailedTask, u32),
}

/// Runs document tasks through the cache and the remote backend.
///
/// Batches run one after another with a pacing delay; inside a batch at most
/// `max_concurrency` tasks are in flight.
pub struct BatchScheduler {
    config: SchedulerConfig,
    backend: Arc<dyn CompletionBackend>,
    cache: Option<Arc<CacheStore>>,
    runner: RetryingTaskRunner,
    keys: CacheKeyBuilder,
    metrics: Arc<dyn MetricsSink>,
}

impl BatchScheduler {
    pub fn new(
        config: SchedulerConfig,
        backend: Arc<dyn CompletionBackend>,
        cache: Option<Arc<CacheStore>>,
    ) -> Result<Self> {
        config.validate()?;
        let runner = RetryingTaskRunner::new(config.retry_policy(), config.timeout());
        Ok(Self {
            config,
            backend,
            cache,
            runner,
            keys: CacheKeyBuilder::new(),
            metrics: noop_sink(),
        })
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn with_key_builder(mut self, keys: CacheKeyBuilder) -> Self {
        self.keys = keys;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    /// Splits, orders and batches `tasks`, then runs every one of them.
    ///
    /// Task failures are reported in [`ProcessingResult::failed`]; the only
    /// error returned is a validation error for duplicate task ids.
    pub async fn process_documents(
        &self,
        tasks: Vec<DocumentTask>,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult> {
        check_unique_ids(&tasks)?;

        let mut scheduled: Vec<DocumentTask> = tasks
            .iter()
            .flat_map(|t| split_large_document(t, self.config.chunk_threshold))
            .collect();
        check_split_ids(&scheduled)?;
        if self.config.priority_based {
            scheduled.sort_by_key(|t| t.priority);
        }

        let run_id = Uuid::new_v4().to_string();
        let total_batches = scheduled.len().div_ceil(self.config.batch_size);
        info!(
            run_id = run_id.as_str(),
            tasks = tasks.len(),
            scheduled = scheduled.len(),
            batches = total_batches,
            max_concurrency = self.config.max_concurrency,
            "processing documents"
        );

        let started = Instant::now();
        let mut agg = PerformanceAggregator::new();
        let mut result = ProcessingResult {
            run_id,
            ..Default::default()
        };

        for (index, batch) in scheduled.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                let remaining = &scheduled[index * self.config.batch_size..];
                warn!(skipped = remaining.len(), "run cancelled; skipping remaining batches");
                for task in remaining {
                    agg.record_failed(0);
                    result.failed.push(self.failure(task, Error::Cancelled, 0));
                }
                break;
            }

            let batch_started = Instant::now();
            let outcomes: Vec<TaskOutcome> = futures::stream::iter(batch.iter())
                .map(|task| self.process_task(task, cancel))
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    TaskOutcome::Completed(task, attempts) => {
                        agg.record_completed(
                            task.elapsed,
                            task.result.usage.total(),
                            task.result.cost.unwrap_or(0.0),
                            attempts,
                            task.source.is_cached(),
                        );
                        result.completed.push(task);
                    }
                    TaskOutcome::Failed(task, attempts) => {
                        agg.record_failed(attempts);
                        result.failed.push(task);
                    }
                }
            }
            agg.record_batch();

            let elapsed = batch_started.elapsed();
            debug!(
                batch = index,
                size = batch.len(),
                duration_ms = elapsed.as_millis() as u64,
                "batch finished"
            );
            self.metrics.record(&MetricEvent::BatchFinished {
                batch: index,
                size: batch.len(),
                elapsed,
            });

            if index + 1 < total_batches && !self.config.batch_delay().is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.batch_delay()) => {}
                }
            }
        }

        let total_elapsed = started.elapsed();
        result.total_tokens = agg.total_tokens();
        result.total_cost = agg.total_cost();
        result.total_elapsed = total_elapsed;
        result.performance = agg.summarize(total_elapsed, self.config.max_concurrency);

        info!(
            run_id = result.run_id.as_str(),
            completed = result.completed.len(),
            failed = result.failed.len(),
            total_tokens = result.total_tokens,
            total_cost = result.total_cost,
            duration_ms = total_elapsed.as_millis() as u64,
            "processing finished"
        );
        Ok(result)
    }

    async fn process_task(&self, task: &DocumentTask, cancel: &CancellationToken) -> TaskOutcome {
        let started = Instant::now();
        let cfg = &self.config;

        if cancel.is_cancelled() {
            return TaskOutcome::Failed(self.failure(task, Error::Cancelled, 0), 0);
        }
        if task.content.trim().is_empty() {
            let err = Error::validation_with_context(
                "document content is empty",
                ErrorContext::new()
                    .with_field_path(format!("tasks.{}.content", task.id))
                    .with_source("batch_scheduler"),
            );
            return TaskOutcome::Failed(self.failure(task, err, 0), 0);
        }

        let key = self.keys.build_key(
            &task.content,
            &cfg.model,
            &cfg.provider,
            &cfg.params,
            &BTreeMap::new(),
        );

        if let Some(cache) = &self.cache {
            if let Some((hit, response)) = cache.lookup_json::<CompletionResponse>(
                key.as_str(),
                &task.content,
                &cfg.model,
                &cfg.provider,
                cfg.similarity_threshold,
            ) {
                let source = if hit.key == key.as_str() {
                    ResultSource::Cache
                } else {
                    ResultSource::Similarity
                };
                let done = self.success(task, response, started.elapsed(), 0, source);
                return TaskOutcome::Completed(done, 0);
            }
        }

        let request = CompletionRequest {
            task_id: task.id.clone(),
            provider: cfg.provider.clone(),
            model: cfg.model.clone(),
            prompt: task.content.clone(),
            params: cfg.params.clone(),
        };
        let backend = &self.backend;
        let run = self
            .runner
            .run(
                &task.id,
                move || {
                    let request = request.clone();
                    async move { backend.complete(request).await }
                },
                cancel,
            )
            .await;

        match run {
            Ok(success) => {
                let attempts = success.attempts;
                let mut response = success.value;
                if response.cost.is_none() {
                    if let Some(pricing) = ModelPricing::for_model(&cfg.model) {
                        response.cost = Some(pricing.cost_of(&response.usage));
                    }
                }
                if let Some(cache) = &self.cache {
                    let metadata = CacheMetadata::new(cfg.model.as_str(), cfg.provider.as_str())
                        .with_usage(response.usage.input_tokens, response.usage.output_tokens)
                        .with_cost(response.cost.unwrap_or(0.0))
                        .with_content_hash(content_digest(&task.content));
                    cache.set_json(key.as_str(), &response, metadata, None);
                }
                let done = self.success(
                    task,
                    response,
                    started.elapsed(),
                    attempts,
                    ResultSource::Remote,
                );
                TaskOutcome::Completed(done, attempts)
            }
            Err(failure) => {
                let attempts = failure.attempts;
                TaskOutcome::Failed(self.failure(task, failure.error, attempts), attempts)
            }
        }
    }

    fn success(
        &self,
        task: &DocumentTask,
        response: CompletionResponse,
        elapsed: Duration,
        attempts: u32,
        source: ResultSource,
    ) -> CompletedTask {
        let retries_used = attempts.saturating_sub(1);
        info!(
            task_id = task.id.as_str(),
            duration_ms = elapsed.as_millis() as u64,
            retries_used,
            ?source,
            "task completed"
        );
        self.metrics.record(&MetricEvent::TaskCompleted {
            task_id: task.id.clone(),
            elapsed,
            retries_used,
            from_cache: source.is_cached(),
        });
        CompletedTask {
            task_id: task.id.clone(),
            parent_id: task.parent_id.clone(),
            result: response,
            elapsed,
            retries_used,
            source,
        }
    }

    fn failure(&self, task: &DocumentTask, error: Error, attempts: u32) -> FailedTask {
        let retries_used = attempts.saturating_sub(1);
        warn!(
            task_id = task.id.as_str(),
            retries_used,
            error = %error,
            "task failed"
        );
        let error = error.to_string();
        self.metrics.record(&MetricEvent::TaskFailed {
            task_id: task.id.clone(),
            error: error.clone(),
            retries_used,
        });
        FailedTask {
            task_id: task.id.clone(),
            parent_id: task.parent_id.clone(),
            error,
            retries_used,
        }
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

fn check_unique_ids(tasks: &[DocumentTask]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        if !seen.insert(task.id.as_str()) {
            return Err(Error::validation_with_context(
                format!("duplicate task id '{}'", task.id),
                ErrorContext::new()
                    .with_field_path(format!("tasks[{}].id", i))
                    .with_source("batch_scheduler"),
            ));
        }
    }
    Ok(())
}

/// Generated chunk ids must not shadow a caller-supplied id.
fn check_split_ids(scheduled: &[DocumentTask]) -> Result<()> {
    let mut seen = HashSet::with_capacity(scheduled.len());
    for task in scheduled {
        if !seen.insert(task.id.as_str()) {
            let owner = task.parent_id.as_deref().unwrap_or(task.id.as_str());
            return Err(Error::validation_with_context(
                format!("task id '{}' collides with a chunk of '{}'", task.id, owner),
                ErrorContext::new()
                    .with_field_path(format!("tasks.{}.id", task.id))
                    .with_source("batch_scheduler"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenUsage;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl CompletionBackend for Echo {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse::new(request.prompt, TokenUsage::new(3, 2)))
        }
    }

    fn scheduler(config: SchedulerConfig) -> Result<BatchScheduler> {
        BatchScheduler::new(config, Arc::new(Echo), None)
    }

    #[test]
    fn test_config_rejects_zero_concurrency() {
        let err = scheduler(SchedulerConfig::new().with_max_concurrency(0)).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("scheduler.max_concurrency")
        );
    }

    #[test]
    fn test_config_rejects_bad_similarity_threshold() {
        assert!(SchedulerConfig::new()
            .with_similarity_threshold(0.0)
            .validate()
            .is_err());
        assert!(SchedulerConfig::new()
            .with_similarity_threshold(1.5)
            .validate()
            .is_err());
        assert!(SchedulerConfig::new()
            .with_similarity_threshold(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = SchedulerConfig::new()
            .with_retry_attempts(2)
            .with_retry_base_delay(Duration::from_millis(250))
            .retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected_before_work() {
        let s = scheduler(SchedulerConfig::new()).unwrap();
        let tasks = vec![
            DocumentTask::new("a", "a.txt", "one"),
            DocumentTask::new("a", "b.txt", "two"),
        ];
        let err = s
            .process_documents(tasks, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_caller_id_colliding_with_chunk_id_rejected() {
        let s = scheduler(SchedulerConfig::new().with_chunk_threshold(10)).unwrap();
        let tasks = vec![
            DocumentTask::new("big", "big.txt", "alpha beta gamma delta"),
            DocumentTask::new("big#chunk-0", "other.txt", "short"),
        ];
        let err = s
            .process_documents(tasks, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("big#chunk-0"));
    }

    #[tokio::test]
    async fn test_empty_content_fails_without_call() {
        let s = scheduler(SchedulerConfig::new()).unwrap();
        let result = s
            .process_documents(
                vec![DocumentTask::new("blank", "blank.txt", "   ")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].error.contains("empty"));
        assert_eq!(result.performance.remote_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_cost_is_estimated() {
        let s = scheduler(SchedulerConfig::new().with_model("openai", "gpt-4o")).unwrap();
        let result = s
            .process_documents(
                vec![DocumentTask::new("t", "t.txt", "hello")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let cost = result.completed[0].result.cost.unwrap();
        let expected = ModelPricing::gpt_4o().cost_of(&TokenUsage::new(3, 2));
        assert!((cost - expected).abs() < 1e-12);
        assert!((result.total_cost - expected).abs() < 1e-12);
        assert_eq!(result.total_tokens, 5);
    }
}
