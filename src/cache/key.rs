//! Cache key generation.

use crate::types::{CompletionRequest, SamplingParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex characters of the digest kept in the readable key.
const KEY_HASH_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub model: String,
    pub provider: String,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.hash
    }
}

/// Collapse whitespace runs and trim, so formatting noise does not defeat the cache.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of the normalized content.
pub fn content_digest(content: &str) -> String {
    hex_sha256(normalize_content(content).as_bytes())
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

fn readable_segment(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Derives deterministic cache keys from request content and everything that
/// can change the response.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    salt: Option<String>,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Mix a namespace into every key (e.g. a prompt template version).
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn build_key(
        &self,
        content: &str,
        model: &str,
        provider: &str,
        params: &SamplingParams,
        extra: &BTreeMap<String, String>,
    ) -> CacheKey {
        let mut parts: BTreeMap<&str, Value> = BTreeMap::new();
        parts.insert("content", Value::String(normalize_content(content)));
        parts.insert("model", Value::String(model.to_string()));
        parts.insert("provider", Value::String(provider.to_string()));
        if let Some(t) = params.temperature {
            parts.insert("temperature", Value::String(format!("{:.2}", t)));
        }
        if let Some(p) = params.top_p {
            parts.insert("top_p", Value::String(format!("{:.2}", p)));
        }
        if let Some(m) = params.max_tokens {
            parts.insert("max_tokens", Value::from(m));
        }
        if !extra.is_empty() {
            let extra: serde_json::Map<String, Value> = extra
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            parts.insert("extra", Value::Object(extra));
        }
        if let Some(ref s) = self.salt {
            parts.insert("salt", Value::String(s.clone()));
        }
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let digest = hex_sha256(canonical.as_bytes());
        CacheKey {
            hash: format!(
                "{}_{}_{}",
                readable_segment(provider),
                readable_segment(model),
                &digest[..KEY_HASH_LEN]
            ),
            model: model.to_string(),
            provider: provider.to_string(),
        }
    }

    pub fn build_for_request(&self, request: &CompletionRequest) -> CacheKey {
        self.build_key(
            &request.prompt,
            &request.model,
            &request.provider,
            &request.params,
            &BTreeMap::new(),
        )
    }
}
