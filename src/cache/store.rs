//! In-memory response store with TTL, LRU eviction and similarity lookup.

use super::entry::{CacheEntry, CacheMetadata, CachedValue};
use super::key::content_digest;
use super::similarity::{SimilarMatch, SimilarityIndex, SimilarityMetric};
use super::stats::{AtomicStats, CacheStats};
use super::ttl::SmartTtl;
use crate::telemetry::{noop_sink, MetricEvent, MetricsSink, RemovalReason};
use crate::{Error, ErrorContext, Result};
use lru::LruCache;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub default_ttl_secs: u64,
    /// Background sweep period; 0 disables the sweeper.
    pub auto_sweep_interval_secs: u64,
    /// Extra name fragments treated as premium tier for models missing from the pricing table.
    pub premium_models: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            max_memory_bytes: 64 * 1024 * 1024,
            default_ttl_secs: 3600,
            auto_sweep_interval_secs: 300,
            premium_models: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }
    pub fn with_max_memory_bytes(mut self, n: usize) -> Self {
        self.max_memory_bytes = n;
        self
    }
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs();
        self
    }
    pub fn with_auto_sweep_interval(mut self, interval: Duration) -> Self {
        self.auto_sweep_interval_secs = interval.as_secs();
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn auto_sweep_interval(&self) -> Option<Duration> {
        (self.auto_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.auto_sweep_interval_secs))
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |field: &str, msg: &str| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("cache.{}", field))
                    .with_source("cache_config"),
            ))
        };
        if self.max_entries == 0 {
            return fail("max_entries", "max_entries must be at least 1");
        }
        if self.max_memory_bytes == 0 {
            return fail("max_memory_bytes", "max_memory_bytes must be at least 1");
        }
        if self.default_ttl_secs == 0 {
            return fail("default_ttl_secs", "default_ttl_secs must be at least 1");
        }
        Ok(())
    }
}

struct StoreState {
    entries: LruCache<String, CacheEntry>,
    total_bytes: usize,
    cost_savings: f64,
}

impl StoreState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// Process-local response cache.
///
/// All bookkeeping sits behind one mutex, so concurrent `get`, `set` and
/// eviction never observe a half-updated entry. Callers only ever receive
/// [`CachedValue`] copies.
pub struct CacheStore {
    config: CacheConfig,
    ttl_policy: SmartTtl,
    similarity: SimilarityIndex,
    state: Mutex<StoreState>,
    stats: AtomicStats,
    metrics: Arc<dyn MetricsSink>,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let mut ttl_policy = SmartTtl::new(config.default_ttl());
        if !config.premium_models.is_empty() {
            ttl_policy = ttl_policy.with_premium_patterns(config.premium_models.clone());
        }
        Ok(Self {
            config,
            ttl_policy,
            similarity: SimilarityIndex::default(),
            state: Mutex::new(StoreState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                cost_savings: 0.0,
            }),
            stats: AtomicStats::default(),
            metrics: noop_sink(),
        })
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn with_similarity_metric(mut self, metric: Box<dyn SimilarityMetric>) -> Self {
        self.similarity = SimilarityIndex::new(metric);
        self
    }

    pub fn with_ttl_policy(mut self, policy: SmartTtl) -> Self {
        self.ttl_policy = policy;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_policy(&self) -> &SmartTtl {
        &self.ttl_policy
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: MetricEvent) {
        self.metrics.record(&event);
    }

    fn record_miss(&self, key: &str) {
        AtomicStats::bump(&self.stats.misses, 1);
        self.emit(MetricEvent::CacheMiss {
            key: key.to_string(),
        });
    }

    fn record_hit(&self, value: &CachedValue, similarity: Option<f64>) {
        AtomicStats::bump(&self.stats.hits, 1);
        if similarity.is_some() {
            AtomicStats::bump(&self.stats.similarity_hits, 1);
        }
        self.emit(MetricEvent::CacheHit {
            key: value.key.clone(),
            cost_saved: value.metadata.cost,
            similarity,
        });
    }

    fn record_removed(&self, count: usize, reason: RemovalReason) {
        if count == 0 {
            return;
        }
        match reason {
            RemovalReason::Capacity => AtomicStats::bump(&self.stats.evictions, count as u64),
            RemovalReason::Expired => AtomicStats::bump(&self.stats.expirations, count as u64),
            RemovalReason::Invalidated => {}
        }
        self.emit(MetricEvent::CacheRemoved { count, reason });
    }

    /// Exact lookup without touching the hit/miss counters on a miss.
    ///
    /// `accept` sees the entry before it is counted as a hit. When it returns `None`
    /// the entry is dropped, counted in `errors`, and the lookup falls through.
    fn lookup_exact_with<T>(
        &self,
        key: &str,
        accept: impl Fn(&CachedValue) -> Option<T>,
    ) -> Option<(CachedValue, T)> {
        if !self.config.enabled {
            return None;
        }
        let now = Instant::now();
        let mut st = self.lock();
        let expired = st.entries.peek(key)?.is_expired_at(now);
        if expired {
            st.remove(key);
            drop(st);
            self.record_removed(1, RemovalReason::Expired);
            return None;
        }
        let mut value = st.entries.peek(key)?.snapshot(key);
        let Some(decoded) = accept(&value) else {
            st.remove(key);
            drop(st);
            AtomicStats::bump(&self.stats.errors, 1);
            return None;
        };
        if let Some(entry) = st.entries.get_mut(key) {
            entry.touch(now);
            value.access_count = entry.access_count;
        }
        st.cost_savings += value.metadata.cost;
        drop(st);
        self.record_hit(&value, None);
        Some((value, decoded))
    }

    /// Live entry for `key`, refreshing its recency. Expired entries are dropped and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        if !self.config.enabled {
            return None;
        }
        let found = self.lookup_exact_with(key, |_| Some(()));
        if found.is_none() {
            self.record_miss(key);
        }
        found.map(|(value, ())| value)
    }

    /// Exact lookup, then a similarity scan when `similarity_threshold` is set.
    /// Counts at most one miss.
    pub fn lookup(
        &self,
        key: &str,
        content: &str,
        model: &str,
        provider: &str,
        similarity_threshold: Option<f64>,
    ) -> Option<CachedValue> {
        self.lookup_with(key, content, model, provider, similarity_threshold, |_| Some(()))
            .map(|(value, ())| value)
    }

    /// Typed [`lookup`](Self::lookup). A payload that no longer decodes is dropped
    /// and the lookup counts as a miss.
    pub fn lookup_json<T: DeserializeOwned>(
        &self,
        key: &str,
        content: &str,
        model: &str,
        provider: &str,
        similarity_threshold: Option<f64>,
    ) -> Option<(CachedValue, T)> {
        self.lookup_with(key, content, model, provider, similarity_threshold, decode_payload)
    }

    fn lookup_with<T>(
        &self,
        key: &str,
        content: &str,
        model: &str,
        provider: &str,
        similarity_threshold: Option<f64>,
        accept: impl Fn(&CachedValue) -> Option<T>,
    ) -> Option<(CachedValue, T)> {
        if !self.config.enabled {
            return None;
        }
        if let Some(found) = self.lookup_exact_with(key, &accept) {
            return Some(found);
        }
        if let Some(threshold) = similarity_threshold {
            if let Some((m, decoded)) =
                self.scan_similar_with(content, model, provider, threshold, &accept)
            {
                debug!(key, matched = m.key.as_str(), similarity = m.similarity, "similarity hit");
                return Some((m.value, decoded));
            }
        }
        self.record_miss(key);
        None
    }

    /// Best live near-duplicate of `content` for the same model and provider.
    pub fn find_similar(
        &self,
        content: &str,
        model: &str,
        provider: &str,
        threshold: f64,
    ) -> Option<SimilarMatch> {
        self.scan_similar_with(content, model, provider, threshold, |_| Some(()))
            .map(|(m, ())| m)
    }

    fn scan_similar_with<T>(
        &self,
        content: &str,
        model: &str,
        provider: &str,
        threshold: f64,
        accept: impl Fn(&CachedValue) -> Option<T>,
    ) -> Option<(SimilarMatch, T)> {
        if !self.config.enabled {
            return None;
        }
        let digest = content_digest(content);
        let now = Instant::now();
        let mut guard = self.lock();
        let st = &mut *guard;
        let (best_key, similarity) = {
            let candidates = st
                .entries
                .iter()
                .filter(|(_, e)| {
                    !e.is_expired_at(now)
                        && e.metadata.model == model
                        && e.metadata.provider == provider
                        && !e.metadata.content_hash.is_empty()
                })
                .map(|(k, e)| (k.as_str(), e.metadata.content_hash.as_str()));
            let (k, s) = self.similarity.best_match(&digest, candidates, threshold)?;
            (k.to_string(), s)
        };
        let mut value = st.entries.peek(&best_key)?.snapshot(&best_key);
        let Some(decoded) = accept(&value) else {
            st.remove(&best_key);
            drop(guard);
            AtomicStats::bump(&self.stats.errors, 1);
            return None;
        };
        if let Some(entry) = st.entries.get_mut(&best_key) {
            entry.touch(now);
            value.access_count = entry.access_count;
        }
        st.cost_savings += value.metadata.cost;
        drop(guard);
        self.record_hit(&value, Some(similarity));
        let found = SimilarMatch {
            key: best_key,
            value,
            similarity,
        };
        Some((found, decoded))
    }

    /// Insert or replace an entry. `ttl_override` bypasses the smart TTL policy.
    pub fn set(
        &self,
        key: &str,
        payload: Vec<u8>,
        metadata: CacheMetadata,
        ttl_override: Option<Duration>,
    ) {
        if !self.config.enabled {
            return;
        }
        let ttl = ttl_override.unwrap_or_else(|| self.ttl_policy.for_metadata(&metadata));
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry::new(key, payload, metadata, ttl);
        if entry.size_bytes > self.config.max_memory_bytes {
            warn!(
                key,
                size_bytes = entry.size_bytes,
                max_memory_bytes = self.config.max_memory_bytes,
                "cache entry larger than the memory budget; not cached"
            );
            return;
        }

        let now = Instant::now();
        let mut st = self.lock();
        st.remove(key);
        let (expired, evicted) = self.make_room(&mut st, entry.size_bytes, now);
        st.total_bytes += entry.size_bytes;
        st.entries.put(key.to_string(), entry);
        drop(st);

        AtomicStats::bump(&self.stats.sets, 1);
        self.record_removed(expired, RemovalReason::Expired);
        self.record_removed(evicted, RemovalReason::Capacity);
        debug!(key, ttl_secs = ttl.as_secs(), evicted, "cache set");
    }

    /// Frees space for an incoming entry. Returns (expired, evicted) counts.
    ///
    /// Expired entries go first; then least-recently-used entries until 20% of
    /// whichever bound was exceeded is free again.
    fn make_room(&self, st: &mut StoreState, incoming: usize, now: Instant) -> (usize, usize) {
        let max_entries = self.config.max_entries;
        let max_bytes = self.config.max_memory_bytes;
        let count_over = |st: &StoreState| st.entries.len() + 1 > max_entries;
        let bytes_over = |st: &StoreState| st.total_bytes + incoming > max_bytes;

        if !count_over(st) && !bytes_over(st) {
            return (0, 0);
        }
        let expired = st.remove_expired(now);
        let over_count = count_over(st);
        let over_bytes = bytes_over(st);
        if !over_count && !over_bytes {
            return (expired, 0);
        }

        let entry_target = if over_count {
            max_entries.saturating_sub(max_entries.div_ceil(5).max(1))
        } else {
            max_entries - 1
        };
        let byte_target = if over_bytes {
            max_bytes - max_bytes / 5
        } else {
            max_bytes
        };

        let mut evicted = 0;
        while st.entries.len() > entry_target || st.total_bytes + incoming > byte_target {
            match st.entries.pop_lru() {
                Some((_, e)) => {
                    st.total_bytes = st.total_bytes.saturating_sub(e.size_bytes);
                    evicted += 1;
                }
                None => break,
            }
        }
        (expired, evicted)
    }

    /// Remove everything (`None`) or entries whose key or model contains `pattern`.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut st = self.lock();
        let removed = match pattern {
            None => {
                let n = st.entries.len();
                st.entries.clear();
                st.total_bytes = 0;
                n
            }
            Some(p) => {
                let keys: Vec<String> = st
                    .entries
                    .iter()
                    .filter(|(k, e)| k.contains(p) || e.metadata.model.contains(p))
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in &keys {
                    st.remove(k);
                }
                keys.len()
            }
        };
        drop(st);
        self.record_removed(removed, RemovalReason::Invalidated);
        debug!(?pattern, removed, "cache invalidated");
        removed
    }

    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let removed = self.lock().remove_expired(now);
        self.record_removed(removed, RemovalReason::Expired);
        removed
    }

    /// Periodically sweeps expired entries until `cancel` fires or the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let interval = self.config.auto_sweep_interval()?;
        let store: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let removed = store.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "expired cache entries swept");
                        }
                    }
                }
            }
        }))
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .peek(key)
            .map(|e| !e.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Physically present entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let st = self.lock();
        let mut stats = CacheStats {
            entries: st.entries.len(),
            total_bytes: st.total_bytes,
            estimated_cost_savings: st.cost_savings,
            ..Default::default()
        };
        let mut oldest = Duration::ZERO;
        let mut newest: Option<Duration> = None;
        let mut accesses: u64 = 0;
        for (_, e) in st.entries.iter() {
            let age = now.saturating_duration_since(e.created_at);
            oldest = oldest.max(age);
            newest = Some(newest.map_or(age, |n| n.min(age)));
            accesses += e.access_count;
        }
        drop(st);
        stats.oldest_entry_age = oldest;
        stats.newest_entry_age = newest.unwrap_or(Duration::ZERO);
        if stats.entries > 0 {
            stats.average_access_count = accesses as f64 / stats.entries as f64;
        }
        self.stats.fill(&mut stats);
        stats
    }

    /// Typed read. A payload that no longer decodes is dropped and treated as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        match self.lookup_exact_with(key, decode_payload) {
            Some((_, decoded)) => Some(decoded),
            None => {
                self.record_miss(key);
                None
            }
        }
    }

    /// Typed write. Serialization failures are logged and skipped.
    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        metadata: CacheMetadata,
        ttl_override: Option<Duration>,
    ) {
        match serde_json::to_vec(value) {
            Ok(payload) => self.set(key, payload, metadata, ttl_override),
            Err(e) => {
                AtomicStats::bump(&self.stats.errors, 1);
                warn!(key, error = %e, "cache payload failed to serialize; not cached");
            }
        }
    }
}

fn decode_payload<T: DeserializeOwned>(value: &CachedValue) -> Option<T> {
    match serde_json::from_slice(&value.payload) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key = value.key.as_str(), error = %e, "cached payload failed to decode");
            None
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("similarity", &self.similarity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::InMemoryMetricsSink;

    fn store(max_entries: usize) -> CacheStore {
        CacheStore::new(CacheConfig::new().with_max_entries(max_entries)).unwrap()
    }

    fn meta(cost: f64) -> CacheMetadata {
        CacheMetadata::new("gpt-4o-mini", "openai").with_cost(cost)
    }

    const HOUR: Option<Duration> = Some(Duration::from_secs(3600));

    #[test]
    fn test_rejects_invalid_config() {
        assert!(matches!(
            CacheStore::new(CacheConfig::new().with_max_entries(0)),
            Err(Error::Configuration { .. })
        ));
        assert!(CacheStore::new(CacheConfig::new().with_max_memory_bytes(0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let s = store(10);
        s.set("k", b"v".to_vec(), meta(0.0), Some(Duration::from_secs(10)));
        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(s.get("k").is_some());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(s.get("k").is_none());
        // expired entry is removed as a side effect
        assert_eq!(s.len(), 0);
        let stats = s.stats();
        assert_eq!((stats.hits, stats.misses, stats.expirations), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_updates_access_bookkeeping() {
        let sink = Arc::new(InMemoryMetricsSink::new(100));
        let s = store(10).with_metrics(sink.clone());
        s.set("k", b"payload".to_vec(), meta(0.02), HOUR);
        tokio::time::advance(Duration::from_secs(5)).await;
        let first = s.get("k").unwrap();
        let second = s.get("k").unwrap();
        assert_eq!(first.payload, b"payload");
        assert_eq!(first.access_count, 1);
        assert_eq!(second.access_count, 2);
        assert_eq!(second.age, Duration::from_secs(5));

        let stats = s.stats();
        assert_eq!(stats.hits, 2);
        assert!((stats.estimated_cost_savings - 0.04).abs() < 1e-12);
        assert_eq!(stats.average_access_count, 2.0);
        let saved = sink.count_where(|e| {
            matches!(e, MetricEvent::CacheHit { cost_saved, .. } if (*cost_saved - 0.02).abs() < 1e-12)
        });
        assert_eq!(saved, 2);
    }

    #[test]
    fn test_lru_eviction_with_hysteresis() {
        let s = store(10);
        for i in 0..10 {
            s.set(&format!("k{}", i), vec![0; 8], meta(0.0), HOUR);
        }
        // k0 becomes most recently used
        assert!(s.get("k0").is_some());
        s.set("k10", vec![0; 8], meta(0.0), HOUR);

        // 20% of 10 freed before insert: 2 evicted, 9 left
        assert_eq!(s.len(), 9);
        assert!(s.contains("k0"));
        assert!(s.contains("k10"));
        assert!(!s.contains("k1"));
        assert!(!s.contains("k2"));
        assert!(s.contains("k3"));
        assert_eq!(s.stats().evictions, 2);
    }

    #[test]
    fn test_most_recent_entry_survives_overflow() {
        let s = store(5);
        for i in 0..50 {
            s.set(&format!("k{}", i), vec![1], meta(0.0), HOUR);
            assert!(s.contains(&format!("k{}", i)));
            assert!(s.len() <= 5);
        }
    }

    #[test]
    fn test_byte_budget_eviction() {
        let probe = CacheEntry::new("k00", vec![0; 100], meta(0.0), Duration::ZERO).size_bytes;
        let s = CacheStore::new(
            CacheConfig::new()
                .with_max_entries(1000)
                .with_max_memory_bytes(probe * 10),
        )
        .unwrap();
        for i in 0..10 {
            s.set(&format!("k{:02}", i), vec![0; 100], meta(0.0), HOUR);
        }
        assert_eq!(s.len(), 10);
        s.set("k10", vec![0; 100], meta(0.0), HOUR);
        // room for the newcomer within 80% of the budget: 7 old entries kept
        assert_eq!(s.len(), 8);
        assert_eq!(s.stats().total_bytes, probe * 8);
        assert!(s.contains("k10"));
        assert!(!s.contains("k00"));
        assert!(s.contains("k03"));
    }

    #[test]
    fn test_oversized_payload_is_skipped() {
        let s = CacheStore::new(CacheConfig::new().with_max_memory_bytes(256)).unwrap();
        s.set("big", vec![0; 1024], meta(0.0), HOUR);
        assert!(s.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted_before_live_ones() {
        let s = store(3);
        s.set("short", vec![1], meta(0.0), Some(Duration::from_secs(1)));
        s.set("a", vec![1], meta(0.0), HOUR);
        s.set("b", vec![1], meta(0.0), HOUR);
        tokio::time::advance(Duration::from_secs(2)).await;
        s.set("c", vec![1], meta(0.0), HOUR);
        assert!(s.contains("a") && s.contains("b") && s.contains("c"));
        let stats = s.stats();
        assert_eq!((stats.expirations, stats.evictions), (1, 0));
    }

    #[test]
    fn test_replacing_key_keeps_byte_count_consistent() {
        let s = store(10);
        s.set("k", vec![0; 10], meta(0.0), HOUR);
        let before = s.stats().total_bytes;
        s.set("k", vec![0; 10], meta(0.0), HOUR);
        assert_eq!(s.len(), 1);
        assert_eq!(s.stats().total_bytes, before);
    }

    #[test]
    fn test_invalidate_by_pattern() {
        let s = store(10);
        s.set("openai_gpt-4o_aa", vec![1], CacheMetadata::new("gpt-4o", "openai"), HOUR);
        s.set("openai_gpt-4o-mini_bb", vec![1], CacheMetadata::new("gpt-4o-mini", "openai"), HOUR);
        s.set("anthropic_claude_cc", vec![1], CacheMetadata::new("claude-3-haiku", "anthropic"), HOUR);
        assert_eq!(s.invalidate(Some("mini")), 1);
        assert_eq!(s.invalidate(Some("claude-3")), 1);
        assert_eq!(s.len(), 1);
        assert_eq!(s.invalidate(None), 1);
        assert!(s.is_empty());
        assert_eq!(s.stats().total_bytes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let s = store(10);
        s.set("a", vec![1], meta(0.0), Some(Duration::from_secs(1)));
        s.set("b", vec![1], meta(0.0), Some(Duration::from_secs(100)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(s.len(), 2);
        assert_eq!(s.sweep_expired(), 1);
        assert_eq!(s.len(), 1);
        assert_eq!(s.sweep_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let s = Arc::new(
            CacheStore::new(CacheConfig::new().with_auto_sweep_interval(Duration::from_secs(60)))
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = s.spawn_sweeper(cancel.clone()).unwrap();
        s.set("a", vec![1], meta(0.0), Some(Duration::from_secs(30)));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(s.len(), 0);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_smart_ttl_applies_without_override() {
        let s = store(10);
        s.set("k", vec![1], CacheMetadata::new("gpt-4o", "openai").with_cost(0.01), None);
        let v = s.get("k").unwrap();
        // base 3600 × cost 2.0 × premium 1.5
        assert_eq!(v.ttl, Duration::from_secs(3600 * 3));
    }

    #[test]
    fn test_similarity_lookup() {
        let s = store(10);
        let digest = content_digest("quarterly report");
        s.set(
            "k1",
            b"cached".to_vec(),
            meta(0.01).with_content_hash(digest),
            HOUR,
        );
        // identical normalized content, different key
        let hit = s
            .lookup("other-key", "  quarterly   report ", "gpt-4o-mini", "openai", Some(0.95))
            .unwrap();
        assert_eq!(hit.key, "k1");
        // other model is never a candidate
        assert!(s.find_similar("quarterly report", "gpt-4o", "openai", 0.5).is_none());

        let stats = s.stats();
        assert_eq!((stats.hits, stats.misses, stats.similarity_hits), (1, 0, 1));
    }

    #[test]
    fn test_lookup_counts_single_miss() {
        let s = store(10);
        assert!(s.lookup("nope", "text", "m", "p", Some(0.9)).is_none());
        let stats = s.stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Answer {
            text: String,
        }
        let s = store(10);
        let a = Answer { text: "42".into() };
        s.set_json("k", &a, meta(0.0), HOUR);
        assert_eq!(s.get_json::<Answer>("k"), Some(a));

        s.set("bad", b"not json".to_vec(), meta(0.0), HOUR);
        assert_eq!(s.get_json::<Answer>("bad"), None);
        assert!(!s.contains("bad"));
        assert_eq!(s.stats().errors, 1);
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let s = CacheStore::new(CacheConfig::new().with_enabled(false)).unwrap();
        s.set("k", vec![1], meta(0.0), HOUR);
        assert!(s.get("k").is_none());
        assert!(s.lookup("k", "text", "m", "p", Some(0.9)).is_none());
        assert!(s.is_empty());
        assert_eq!(s.stats().misses, 0);
    }

    #[test]
    fn test_huge_default_ttl_is_capped_on_set() {
        let config = CacheConfig {
            default_ttl_secs: 10_000_000_000_000_000_000,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_ok());
        let s = CacheStore::new(config).unwrap();
        s.set("k", b"v".to_vec(), meta(1.0), None);
        assert_eq!(s.get("k").unwrap().ttl, Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn test_undecodable_similar_entry_is_not_a_hit() {
        #[derive(Debug, Deserialize)]
        struct Answer {
            #[allow(dead_code)]
            text: String,
        }
        let s = store(10);
        s.set(
            "k1",
            b"not json".to_vec(),
            meta(0.25).with_content_hash(content_digest("quarterly report")),
            HOUR,
        );
        let found =
            s.lookup_json::<Answer>("other-key", "quarterly report", "gpt-4o-mini", "openai", Some(0.95));
        assert!(found.is_none());
        assert!(!s.contains("k1"));
        let stats = s.stats();
        assert_eq!((stats.hits, stats.misses, stats.errors), (0, 1, 1));
        assert_eq!(stats.similarity_hits, 0);
        assert_eq!(stats.estimated_cost_savings, 0.0);
    }

    #[test]
    fn test_concurrent_access_keeps_bookkeeping_consistent() {
        let s = Arc::new(store(64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 7 + i) % 100);
                        if s.get(&key).is_none() {
                            s.set(&key, vec![0; 16], meta(0.0), HOUR);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = s.stats();
        assert!(stats.entries <= 64);
        assert_eq!(stats.hits + stats.misses, 1600);
        let expected_bytes: usize = {
            let st = s.lock();
            st.entries.iter().map(|(_, e)| e.size_bytes).sum()
        };
        assert_eq!(stats.total_bytes, expected_bytes);
    }
}
