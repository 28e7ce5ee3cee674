//! Cache entry and the metadata recorded alongside each payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Bookkeeping overhead charged per entry on top of key and payload bytes.
pub(crate) const ENTRY_OVERHEAD_BYTES: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub model: String,
    pub provider: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Cost of producing the payload; reported as "saved" on every hit.
    pub cost: f64,
    /// Digest of the normalized request content, used for similarity lookups.
    pub content_hash: String,
}

impl CacheMetadata {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = hash.into();
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) payload: Vec<u8>,
    pub(crate) metadata: CacheMetadata,
    pub(crate) created_at: Instant,
    pub(crate) last_accessed_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) access_count: u64,
    pub(crate) size_bytes: usize,
}

impl CacheEntry {
    pub(crate) fn new(key: &str, payload: Vec<u8>, metadata: CacheMetadata, ttl: Duration) -> Self {
        let now = Instant::now();
        let size_bytes = key.len()
            + payload.len()
            + metadata.model.len()
            + metadata.provider.len()
            + metadata.content_hash.len()
            + ENTRY_OVERHEAD_BYTES;
        Self {
            payload,
            metadata,
            created_at: now,
            last_accessed_at: now,
            ttl,
            access_count: 0,
            size_bytes,
        }
    }

    /// Expired once `created_at + ttl` has been reached.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.access_count = self.access_count.saturating_add(1);
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }

    pub(crate) fn snapshot(&self, key: &str) -> CachedValue {
        CachedValue {
            key: key.to_string(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            age: self.created_at.elapsed(),
            ttl: self.ttl,
            access_count: self.access_count,
        }
    }
}

/// An owned copy of a cache entry handed to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub key: String,
    pub payload: Vec<u8>,
    pub metadata: CacheMetadata,
    pub age: Duration,
    pub ttl: Duration,
    pub access_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary() {
        let entry = CacheEntry::new("k", vec![1, 2, 3], CacheMetadata::default(), Duration::from_secs(10));
        let created = entry.created_at;
        assert!(!entry.is_expired_at(created + Duration::from_millis(9_999)));
        assert!(entry.is_expired_at(created + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_keeps_access_after_creation() {
        let mut entry = CacheEntry::new("k", vec![], CacheMetadata::default(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(3)).await;
        entry.touch(Instant::now());
        assert_eq!(entry.access_count, 1);
        assert!(entry.last_accessed_at >= entry.created_at);
        assert_eq!(entry.last_accessed_at - entry.created_at, Duration::from_secs(3));
    }

    #[test]
    fn test_size_accounts_for_key_and_payload() {
        let entry = CacheEntry::new("abc", vec![0; 100], CacheMetadata::new("m", "p"), Duration::ZERO);
        assert_eq!(entry.size_bytes, 3 + 100 + 1 + 1 + ENTRY_OVERHEAD_BYTES);
    }
}
