//! # ai-lib-docproc
//!
//! 面向 AI 文档分析的响应缓存与有界并发批处理引擎。
//!
//! Response cache plus bounded-parallelism batch processor for AI document
//! analysis.
//!
//! ## Overview
//!
//! Sending many documents through a remote completion service is slow, costly
//! and flaky. This crate pairs two pieces to make that cheaper and sturdier:
//!
//! - **Response cache**: deterministic keys, a cost-aware TTL, near-duplicate
//!   detection and memory-bounded LRU eviction via [`cache`].
//! - **Batch processor**: priority ordering, batching with pacing, bounded
//!   concurrency, per-task timeout, retry with backoff and large-input
//!   chunking via [`batch`].
//!
//! The remote call itself is injected through
//! [`transport::CompletionBackend`]; an OpenAI-compatible HTTP backend is
//! included.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_docproc::batch::{BatchScheduler, DocumentTask};
//! use ai_lib_docproc::cache::CacheStore;
//! use ai_lib_docproc::transport::HttpCompletionBackend;
//! use ai_lib_docproc::EngineConfig;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_docproc::Result<()> {
//!     let config = EngineConfig::default().apply_env();
//!     config.validate()?;
//!
//!     let cache = Arc::new(CacheStore::new(config.cache.clone())?);
//!     let backend = Arc::new(HttpCompletionBackend::from_env("openai")?);
//!     let scheduler = BatchScheduler::new(config.scheduler, backend, Some(cache.clone()))?;
//!
//!     let tasks = vec![DocumentTask::new("readme", "README.md", "# Project\n...")];
//!     let result = scheduler.process_documents(tasks, &CancellationToken::new()).await?;
//!     println!("hit rate: {:.2}", cache.stats().hit_rate);
//!     println!("completed: {}", result.completed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Task model, scheduler, retry runner, run results |
//! | [`cache`] | Key derivation, store, smart TTL, similarity index |
//! | [`config`] | YAML + environment configuration |
//! | [`telemetry`] | Metric events, sinks and performance summaries |
//! | [`tokens`] | Token estimation and model pricing |
//! | [`transport`] | Remote completion backends |
//! | [`types`] | Request/response types |

pub mod batch;
pub mod cache;
pub mod config;
pub mod telemetry;
pub mod tokens;
pub mod transport;
pub mod types;

mod error;

pub use batch::{BatchScheduler, DocumentTask, ProcessingResult, SchedulerConfig};
pub use cache::{CacheConfig, CacheStore};
pub use config::EngineConfig;
pub use error::{Error, ErrorContext};
pub use telemetry::{MetricEvent, MetricsSink};
pub use transport::CompletionBackend;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
