//! Model pricing and cost estimation.

use crate::types::TokenUsage;
use serde::{Deserialize, Serialize};

/// Output price (USD per 1k tokens) at or above which a model counts as premium tier.
pub const PREMIUM_OUTPUT_COST_PER_1K: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub currency: String,
}

impl ModelPricing {
    pub fn new(model: &str, input: f64, output: f64) -> Self {
        Self {
            model: model.into(),
            input_cost_per_1k: input,
            output_cost_per_1k: output,
            currency: "USD".into(),
        }
    }

    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> CostEstimate {
        let ic = (input_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let oc = (output_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        CostEstimate {
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            input_cost: ic,
            output_cost: oc,
            total_cost: ic + oc,
            currency: self.currency.clone(),
        }
    }

    pub fn cost_of(&self, usage: &TokenUsage) -> f64 {
        self.calculate_cost(usage.input_tokens, usage.output_tokens)
            .total_cost
    }

    pub fn is_premium(&self) -> bool {
        self.output_cost_per_1k >= PREMIUM_OUTPUT_COST_PER_1K
    }

    pub fn gpt_4o() -> Self {
        Self::from_row(&PRICING_TABLE[1])
    }
    pub fn gpt_4o_mini() -> Self {
        Self::from_row(&PRICING_TABLE[0])
    }
    pub fn claude_3_opus() -> Self {
        Self::from_row(&PRICING_TABLE[3])
    }
    pub fn claude_3_haiku() -> Self {
        Self::from_row(&PRICING_TABLE[5])
    }

    /// First table row whose name fragment occurs in `model` (case-insensitive).
    pub fn for_model(model: &str) -> Option<Self> {
        let m = model.to_lowercase();
        PRICING_TABLE
            .iter()
            .find(|row| m.contains(row.0))
            .map(Self::from_row)
    }

    fn from_row(row: &(&str, f64, f64)) -> Self {
        Self::new(row.0, row.1, row.2)
    }
}

/// (name fragment, input USD/1k, output USD/1k). More specific names come first.
const PRICING_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4o", 0.005, 0.015),
    ("gpt-4-turbo", 0.01, 0.03),
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3-5-sonnet", 0.003, 0.015),
    ("claude-3-haiku", 0.00025, 0.00125),
];

/// Cost breakdown for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl CostEstimate {
    pub fn format(&self) -> String {
        format!("{} {:.6}", self.currency, self.total_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_specific_names() {
        assert_eq!(ModelPricing::for_model("gpt-4o-mini").unwrap().model, "gpt-4o-mini");
        assert_eq!(ModelPricing::for_model("openai/GPT-4o").unwrap().model, "gpt-4o");
        assert!(ModelPricing::for_model("llama-3-8b").is_none());
    }

    #[test]
    fn test_cost_calculation() {
        let pricing = ModelPricing::gpt_4o();
        let est = pricing.calculate_cost(2000, 1000);
        assert!((est.input_cost - 0.01).abs() < 1e-12);
        assert!((est.output_cost - 0.015).abs() < 1e-12);
        assert!((pricing.cost_of(&TokenUsage::new(2000, 1000)) - 0.025).abs() < 1e-12);
        assert_eq!(est.format(), "USD 0.025000");
    }

    #[test]
    fn test_table_rows_resolve() {
        assert_eq!(
            ModelPricing::for_model("anthropic/claude-3-5-sonnet-20240620").map(|p| p.model),
            Some("claude-3-5-sonnet".to_string())
        );
        assert_eq!(ModelPricing::for_model("gpt-4-turbo-preview").unwrap().output_cost_per_1k, 0.03);
    }

    #[test]
    fn test_premium_tier() {
        assert!(ModelPricing::gpt_4o().is_premium());
        assert!(ModelPricing::claude_3_opus().is_premium());
        assert!(!ModelPricing::gpt_4o_mini().is_premium());
        assert!(!ModelPricing::claude_3_haiku().is_premium());
    }
}
