//! 批处理模块：文档任务的优先级排序、分批、有界并发执行与重试。
//!
//! # Document Batch Processing Module
//!
//! Turns a list of documents into remote completion calls without exceeding a
//! concurrency budget, and without letting one bad document sink the run.
//!
//! ## Flow
//!
//! 1. Oversized documents are split into ordered sub-tasks.
//! 2. Tasks are ordered by priority (1 first) when `priority_based` is set.
//! 3. Tasks are grouped into batches of `batch_size`; batches run one after
//!    another with a pacing delay in between.
//! 4. Inside a batch at most `max_concurrency` tasks are in flight. Each task
//!    probes the cache first and only calls the backend on a miss.
//! 5. Outcomes land in [`ProcessingResult`]; new responses are written back
//!    to the cache.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`DocumentTask`] | One document to analyse |
//! | [`BatchScheduler`] | Orders, batches and runs tasks |
//! | [`SchedulerConfig`] | Concurrency, batching, timeout and retry settings |
//! | [`RetryingTaskRunner`] | Timeout + exponential backoff around one call |
//! | [`ProcessingResult`] | Completed/failed tasks and run performance |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_lib_docproc::batch::{BatchScheduler, DocumentTask, SchedulerConfig};
//! use ai_lib_docproc::cache::{CacheConfig, CacheStore};
//! use ai_lib_docproc::transport::HttpCompletionBackend;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> ai_lib_docproc::Result<()> {
//! let backend = Arc::new(HttpCompletionBackend::from_env("openai")?);
//! let cache = Arc::new(CacheStore::new(CacheConfig::default())?);
//! let scheduler = BatchScheduler::new(SchedulerConfig::default(), backend, Some(cache))?;
//!
//! let tasks = vec![
//!     DocumentTask::new("1", "README.md", "Project overview..."),
//!     DocumentTask::new("2", "design.md", "Architecture notes..."),
//! ];
//! let result = scheduler
//!     .process_documents(tasks, &CancellationToken::new())
//!     .await?;
//! println!("{} completed, {} failed", result.completed.len(), result.failed.len());
//! # Ok(())
//! # }
//! ```

mod result;
mod runner;
mod scheduler;
mod task;

pub use result::{CompletedTask, FailedTask, ProcessingResult, ResultSource};
pub use runner::{RetryPolicy, RetryingTaskRunner, RunFailure, RunSuccess};
pub use scheduler::{BatchScheduler, SchedulerConfig};
pub use task::{
    calculate_priority, split_large_document, DocumentTask, HIGHEST_PRIORITY, LOWEST_PRIORITY,
};
