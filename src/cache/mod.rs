//! 响应缓存模块：为重复或近似重复的请求复用已计算的响应。
//!
//! # Response Caching Module
//!
//! Reusing earlier responses is the cheapest remote call there is. This module
//! derives deterministic keys, keeps responses in a memory-bounded store with a
//! cost-aware TTL, and offers a secondary near-duplicate lookup.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKeyBuilder`] | Deterministic key from content, model, provider and params |
//! | [`CacheStore`] | TTL bookkeeping, access statistics, LRU eviction, sweeping |
//! | [`CacheConfig`] | Capacity, memory budget, default TTL, sweep interval |
//! | [`SmartTtl`] | TTL scaled by cost, output size and model tier |
//! | [`SimilarityIndex`] | Near-duplicate scan with a pluggable [`SimilarityMetric`] |
//! | [`CacheStats`] | Hit rate, sizes, ages, estimated savings |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_docproc::cache::{CacheConfig, CacheKeyBuilder, CacheMetadata, CacheStore};
//! use ai_lib_docproc::types::SamplingParams;
//! use std::collections::BTreeMap;
//!
//! let store = CacheStore::new(CacheConfig::new().with_max_entries(100)).unwrap();
//! let key = CacheKeyBuilder::new().build_key(
//!     "Summarize the attached plan",
//!     "gpt-4o-mini",
//!     "openai",
//!     &SamplingParams::new().temperature(0.0),
//!     &BTreeMap::new(),
//! );
//! store.set(key.as_str(), b"summary".to_vec(), CacheMetadata::new("gpt-4o-mini", "openai"), None);
//! assert!(store.get(key.as_str()).is_some());
//! ```
//!
//! ## Eviction
//!
//! Expired entries are dropped first. When the store is still over its entry
//! or byte budget, least-recently-used entries go until 20% of that budget is
//! free, so a full cache does not evict on every insert.

mod entry;
mod key;
mod similarity;
mod stats;
mod store;
mod ttl;

pub use entry::{CacheMetadata, CachedValue};
pub use key::{content_digest, normalize_content, CacheKey, CacheKeyBuilder};
pub use similarity::{DigestOverlap, SimilarMatch, SimilarityIndex, SimilarityMetric};
pub use stats::CacheStats;
pub use store::{CacheConfig, CacheStore};
pub use ttl::{SmartTtl, MAX_TTL};
