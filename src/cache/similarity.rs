//! Near-duplicate lookup over live cache entries.
//!
//! This is a secondary path, consulted only after an exact-key miss. The scan
//! is linear in the number of entries, which the store's capacity bounds.

use super::entry::CachedValue;

/// Scores how alike two content digests are, in `[0, 1]`.
///
/// The default [`DigestOverlap`] is a cheap placeholder; an embedding-backed
/// metric can be swapped in without touching callers.
pub trait SimilarityMetric: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;

    fn name(&self) -> &'static str;
}

/// Position-wise character agreement, normalized by the longer input.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestOverlap;

impl SimilarityMetric for DigestOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        let max_len = a.chars().count().max(b.chars().count());
        if max_len == 0 {
            return 0.0;
        }
        let same = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
        same as f64 / max_len as f64
    }

    fn name(&self) -> &'static str {
        "digest_overlap"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarMatch {
    pub key: String,
    pub value: CachedValue,
    pub similarity: f64,
}

pub struct SimilarityIndex {
    metric: Box<dyn SimilarityMetric>,
}

impl SimilarityIndex {
    pub fn new(metric: Box<dyn SimilarityMetric>) -> Self {
        Self { metric }
    }

    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }

    /// Best candidate scoring at or above `threshold`. Ties keep the first seen.
    pub fn best_match<'a, I>(&self, digest: &str, candidates: I, threshold: f64) -> Option<(&'a str, f64)>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut best: Option<(&'a str, f64)> = None;
        for (key, candidate_digest) in candidates {
            let score = self.metric.score(digest, candidate_digest);
            if score < threshold {
                continue;
            }
            match best {
                Some((_, s)) if s >= score => {}
                _ => best = Some((key, score)),
            }
        }
        best
    }
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new(Box::new(DigestOverlap))
    }
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("metric", &self.metric.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_scores() {
        let m = DigestOverlap;
        assert_eq!(m.score("abcd", "abcd"), 1.0);
        assert_eq!(m.score("abcd", "abcx"), 0.75);
        assert_eq!(m.score("ab", "abcd"), 0.5);
        assert_eq!(m.score("", ""), 0.0);
    }

    #[test]
    fn test_best_match_respects_threshold() {
        let index = SimilarityIndex::default();
        let candidates = vec![("k1", "abxx"), ("k2", "abcx"), ("k3", "zzzz")];
        let hit = index.best_match("abcd", candidates.clone(), 0.7);
        assert_eq!(hit, Some(("k2", 0.75)));
        assert_eq!(index.best_match("abcd", candidates, 0.9), None);
    }

    struct Always(f64);
    impl SimilarityMetric for Always {
        fn score(&self, _: &str, _: &str) -> f64 {
            self.0
        }
        fn name(&self) -> &'static str {
            "always"
        }
    }

    #[test]
    fn test_custom_metric_and_tie_break() {
        let index = SimilarityIndex::new(Box::new(Always(0.9)));
        assert_eq!(index.metric_name(), "always");
        let hit = index.best_match("x", vec![("first", "a"), ("second", "b")], 0.5);
        assert_eq!(hit, Some(("first", 0.9)));
    }
}
