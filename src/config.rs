//! Engine configuration: YAML file, then environment overrides, then validation.

use crate::batch::SchedulerConfig;
use crate::cache::CacheConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read config file: {}", e),
                ErrorContext::new()
                    .with_field_path(path.to_string_lossy())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Applies `AI_DOC_*` overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from any variable source. Unparseable values are logged and ignored.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let s = &mut self.scheduler;
        override_with(&lookup, "AI_DOC_MAX_CONCURRENCY", &mut s.max_concurrency);
        override_with(&lookup, "AI_DOC_BATCH_SIZE", &mut s.batch_size);
        override_with(&lookup, "AI_DOC_TIMEOUT_MS", &mut s.timeout_ms);
        override_with(&lookup, "AI_DOC_RETRY_ATTEMPTS", &mut s.retry_attempts);
        override_with(&lookup, "AI_DOC_RETRY_BASE_DELAY_MS", &mut s.retry_base_delay_ms);
        override_with(&lookup, "AI_DOC_RETRY_MAX_DELAY_MS", &mut s.retry_max_delay_ms);
        override_with(&lookup, "AI_DOC_BATCH_DELAY_MS", &mut s.batch_delay_ms);
        override_with(&lookup, "AI_DOC_PRIORITY_BASED", &mut s.priority_based);
        override_with(&lookup, "AI_DOC_CHUNK_THRESHOLD", &mut s.chunk_threshold);
        if let Some(t) = parse_var::<f64>(&lookup, "AI_DOC_SIMILARITY_THRESHOLD") {
            s.similarity_threshold = Some(t);
        }

        let c = &mut self.cache;
        override_with(&lookup, "AI_DOC_CACHE_MAX_ENTRIES", &mut c.max_entries);
        override_with(&lookup, "AI_DOC_CACHE_MAX_BYTES", &mut c.max_memory_bytes);
        override_with(&lookup, "AI_DOC_CACHE_DEFAULT_TTL_SECS", &mut c.default_ttl_secs);
        override_with(
            &lookup,
            "AI_DOC_CACHE_SWEEP_INTERVAL_SECS",
            &mut c.auto_sweep_interval_secs,
        );
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.cache.validate()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = raw.as_str(), "ignoring unparseable environment override");
            None
        }
    }
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    if let Some(v) = parse_var(lookup, name) {
        *target = v;
    }
}
