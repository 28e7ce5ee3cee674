//! Smart TTL: keep expensive or verbose responses around longer.

use super::entry::CacheMetadata;
use crate::tokens::ModelPricing;
use std::time::Duration;

pub const MAX_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

const COST_FACTOR_CAP: f64 = 2.0;
const COST_UNIT: f64 = 0.01;
const OUTPUT_FACTOR_CAP: f64 = 1.5;
const OUTPUT_UNIT: f64 = 1000.0;
const PREMIUM_MODEL_FACTOR: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct SmartTtl {
    base_ttl: Duration,
    max_ttl: Duration,
    /// Name fragments marking premium models the pricing table does not know.
    premium_patterns: Vec<String>,
}

impl SmartTtl {
    pub fn new(base_ttl: Duration) -> Self {
        Self {
            base_ttl,
            max_ttl: MAX_TTL,
            premium_patterns: vec![
                "gpt-4".to_string(),
                "opus".to_string(),
                "o1".to_string(),
                "ultra".to_string(),
            ],
        }
    }

    pub fn with_max_ttl(mut self, max: Duration) -> Self {
        self.max_ttl = max.min(MAX_TTL);
        self
    }

    pub fn with_premium_patterns(mut self, patterns: Vec<String>) -> Self {
        self.premium_patterns = patterns.into_iter().map(|p| p.to_lowercase()).collect();
        self
    }

    pub fn base_ttl(&self) -> Duration {
        self.base_ttl
    }

    pub fn is_premium(&self, model: &str) -> bool {
        match ModelPricing::for_model(model) {
            Some(pricing) => pricing.is_premium(),
            None => {
                let m = model.to_lowercase();
                self.premium_patterns.iter().any(|p| m.contains(p.as_str()))
            }
        }
    }

    pub fn compute(
        &self,
        _input_tokens: u32,
        output_tokens: u32,
        cost: f64,
        model: &str,
    ) -> Duration {
        let cost_factor = (1.0 + cost.max(0.0) / COST_UNIT).min(COST_FACTOR_CAP);
        let output_factor = (1.0 + output_tokens as f64 / OUTPUT_UNIT).min(OUTPUT_FACTOR_CAP);
        let model_factor = if self.is_premium(model) {
            PREMIUM_MODEL_FACTOR
        } else {
            1.0
        };
        let secs = self.base_ttl.as_secs_f64() * cost_factor * output_factor * model_factor;
        Duration::try_from_secs_f64(secs.min(self.max_ttl.as_secs_f64()))
            .unwrap_or(self.max_ttl)
    }

    pub fn for_metadata(&self, metadata: &CacheMetadata) -> Duration {
        self.compute(
            metadata.input_tokens,
            metadata.output_tokens,
            metadata.cost,
            &metadata.model,
        )
    }
}

impl Default for SmartTtl {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
