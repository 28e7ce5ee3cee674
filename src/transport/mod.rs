//! 传输层：远程补全调用的抽象与 HTTP 参考实现。
//!
//! # Transport
//!
//! The scheduler never talks to the network directly. It calls a
//! [`CompletionBackend`] injected at construction time, so tests can stub the
//! remote service and applications can plug in any provider SDK.

pub mod http;

pub use http::HttpCompletionBackend;

use crate::types::{CompletionRequest, CompletionResponse};
use crate::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Transport error: {0}")]
    Other(String),
}

/// The remote AI completion call.
///
/// Implementations should map failures onto [`crate::Error`] so the retry
/// runner can tell transient problems (`Error::is_retryable`) from terminal
/// ones.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    fn name(&self) -> &'static str {
        "custom"
    }
}
