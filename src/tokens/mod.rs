//! Token 估算与成本计算模块。
//!
//! # Token Counting and Cost Estimation Module
//!
//! Token estimates feed [`DocumentTask::estimated_tokens`](crate::batch::DocumentTask);
//! the pricing table fills in costs when a backend does not report one and
//! decides which models are premium tier for the smart TTL policy.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenCounter`] | Trait for token counting implementations |
//! | [`CharacterEstimator`] | Fast character-based approximation (4 chars ≈ 1 token) |
//! | [`ModelPricing`] | Pricing information per model |
//! | [`CostEstimate`] | Estimated cost breakdown |

mod counter;
mod pricing;

pub use counter::{CharacterEstimator, TokenCounter};
pub use pricing::{CostEstimate, ModelPricing, PREMIUM_OUTPUT_COST_PER_1K};
