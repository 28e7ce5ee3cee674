//! 类型模块：远程补全调用的请求与响应类型。
//!
//! # Types Module
//!
//! Strongly typed request/response contract shared by the cache, the batch
//! scheduler and the completion backends.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CompletionRequest`] | One remote call: provider, model, prompt, sampling params |
//! | [`CompletionResponse`] | Response content, token usage and optional cost |
//! | [`SamplingParams`] | Temperature / top-p / max tokens |
//! | [`TokenUsage`] | Input and output token counts |

pub mod completion;

pub use completion::{CompletionRequest, CompletionResponse, SamplingParams, TokenUsage};
