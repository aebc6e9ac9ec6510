//! Similarity scoring between recommendations.
//!
//! The engine never computes embeddings itself. Callers plug in a
//! [`SimilarityScorer`]:
//! - [`EmbeddingScorer`]: cosine over vectors from an [`EmbeddingProvider`], cached by text
//! - [`PrecomputedEmbeddings`]: cosine over vectors supplied up front, keyed by ID
//! - [`TermOverlapScorer`]: Jaccard over normalized term sets, no vectors needed
//! - [`FnScorer`]: any injected `FnMut(&Recommendation, &Recommendation) -> f64`

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::recommendation::normalize::{embedding_text, jaccard, term_set};
use crate::recommendation::Recommendation;

/// Cosine similarity clamped to [0, 1].
///
/// Returns 0.0 when the vectors differ in length or either magnitude is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    clamp_score(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Clamp a raw score into [0, 1], mapping NaN to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Pairwise scorer used by the clustering engine.
pub trait SimilarityScorer {
    /// Called once per recommendation before any pair is scored.
    ///
    /// An error excludes the recommendation from matching; it still passes
    /// through to the output unchanged.
    fn prepare(&mut self, _rec: &Recommendation) -> EmbeddingResult<()> {
        Ok(())
    }

    /// Similarity of two prepared recommendations.
    fn score(&mut self, a: &Recommendation, b: &Recommendation) -> f64;
}

// ============================================================================
// Embedding Provider
// ============================================================================

/// External text-embedding collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait EmbeddingProvider {
    /// Embed a piece of text.
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;
}

/// Cosine scorer backed by an [`EmbeddingProvider`].
///
/// Embeddings are cached by recommendation text for the lifetime of the
/// scorer, so identical texts cost one provider call per run. Failed lookups
/// are cached too.
pub struct EmbeddingScorer<P> {
    provider: P,
    by_text: HashMap<String, Result<Vec<f32>, String>>,
    by_id: HashMap<String, Vec<f32>>,
    dimension: Option<usize>,
    provider_calls: usize,
}

impl<P: EmbeddingProvider> EmbeddingScorer<P> {
    /// Create a scorer around a provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            by_text: HashMap::new(),
            by_id: HashMap::new(),
            dimension: None,
            provider_calls: 0,
        }
    }

    /// Number of calls made to the provider so far.
    pub fn provider_calls(&self) -> usize {
        self.provider_calls
    }

    /// Number of distinct texts in the cache.
    pub fn cached_texts(&self) -> usize {
        self.by_text.len()
    }

    fn lookup(&mut self, text: String) -> Result<Vec<f32>, String> {
        if let Some(cached) = self.by_text.get(&text) {
            return cached.clone();
        }
        self.provider_calls += 1;
        let fetched = self.provider.embed(&text).map_err(|e| e.to_string());
        self.by_text.insert(text, fetched.clone());
        fetched
    }
}

impl<P: EmbeddingProvider> SimilarityScorer for EmbeddingScorer<P> {
    fn prepare(&mut self, rec: &Recommendation) -> EmbeddingResult<()> {
        let vector = self
            .lookup(embedding_text(rec))
            .map_err(|message| EmbeddingError::Unavailable { message })?;

        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }

        self.by_id.insert(rec.id.clone(), vector);
        Ok(())
    }

    fn score(&mut self, a: &Recommendation, b: &Recommendation) -> f64 {
        match (self.by_id.get(&a.id), self.by_id.get(&b.id)) {
            (Some(va), Some(vb)) => cosine_similarity(va, vb),
            _ => 0.0,
        }
    }
}

// ============================================================================
// Precomputed Embeddings
// ============================================================================

/// Cosine scorer over vectors supplied by the caller, keyed by recommendation ID.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
}

impl PrecomputedEmbeddings {
    /// Create an empty set of vectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the vector for a recommendation.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(id.into(), vector);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, id: impl Into<String>, vector: Vec<f32>) -> Self {
        self.insert(id, vector);
        self
    }
}

impl FromIterator<(String, Vec<f32>)> for PrecomputedEmbeddings {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f32>)>>(iter: I) -> Self {
        Self {
            vectors: iter.into_iter().collect(),
        }
    }
}

impl SimilarityScorer for PrecomputedEmbeddings {
    fn prepare(&mut self, rec: &Recommendation) -> EmbeddingResult<()> {
        match self.vectors.get(&rec.id) {
            Some(v) if !v.is_empty() => Ok(()),
            Some(_) => Err(EmbeddingError::Unavailable {
                message: "embedding vector is empty".to_string(),
            }),
            None => Err(EmbeddingError::Unavailable {
                message: "no precomputed embedding".to_string(),
            }),
        }
    }

    fn score(&mut self, a: &Recommendation, b: &Recommendation) -> f64 {
        match (self.vectors.get(&a.id), self.vectors.get(&b.id)) {
            (Some(va), Some(vb)) => cosine_similarity(va, vb),
            _ => 0.0,
        }
    }
}

// ============================================================================
// Term Overlap
// ============================================================================

/// Jaccard similarity over normalized term sets.
#[derive(Debug, Clone, Default)]
pub struct TermOverlapScorer {
    terms: HashMap<String, BTreeSet<String>>,
}

impl TermOverlapScorer {
    /// Create an empty scorer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimilarityScorer for TermOverlapScorer {
    fn prepare(&mut self, rec: &Recommendation) -> EmbeddingResult<()> {
        let terms = term_set(rec);
        debug!(recommendation_id = %rec.id, terms = terms.len(), "Prepared term set");
        self.terms.insert(rec.id.clone(), terms);
        Ok(())
    }

    fn score(&mut self, a: &Recommendation, b: &Recommendation) -> f64 {
        match (self.terms.get(&a.id), self.terms.get(&b.id)) {
            (Some(ta), Some(tb)) if !ta.is_empty() && !tb.is_empty() => jaccard(ta, tb),
            _ => 0.0,
        }
    }
}

// ============================================================================
// Injected Function
// ============================================================================

/// Adapts a plain function into a [`SimilarityScorer`].
pub struct FnScorer<F>(pub F);

impl<F> SimilarityScorer for FnScorer<F>
where
    F: FnMut(&Recommendation, &Recommendation) -> f64,
{
    fn score(&mut self, a: &Recommendation, b: &Recommendation) -> f64 {
        (self.0)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, title: &str) -> Recommendation {
        Recommendation::new(id, title, "doc")
    }

    // ========================================================================
    // Cosine tests
    // ========================================================================

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = [0.3, -0.2, 0.9];
        let b = [0.1, 0.4, 0.7];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_clamps_negative() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_magnitude_and_mismatch() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_clamp_score_nan() {
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(1.7), 1.0);
    }

    // ========================================================================
    // Embedding scorer tests
    // ========================================================================

    #[test]
    fn test_embedding_scorer_caches_by_text() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .times(1)
            .returning(|_| Ok(vec![1.0, 0.0]));

        let mut scorer = EmbeddingScorer::new(provider);
        let a = rec("a", "Same text");
        let b = Recommendation::new("b", "Same text", "other-doc");

        scorer.prepare(&a).unwrap();
        scorer.prepare(&b).unwrap();

        assert_eq!(scorer.provider_calls(), 1);
        assert_eq!(scorer.cached_texts(), 1);
        assert!((scorer.score(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_embedding_scorer_caches_failures() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().times(1).returning(|_| {
            Err(EmbeddingError::Unavailable {
                message: "service down".to_string(),
            })
        });

        let mut scorer = EmbeddingScorer::new(provider);
        let a = rec("a", "Text");
        let b = rec("b", "Text");

        assert!(scorer.prepare(&a).is_err());
        let err = scorer.prepare(&b).unwrap_err();
        assert!(err.to_string().contains("service down"));
        assert_eq!(scorer.provider_calls(), 1);
    }

    #[test]
    fn test_embedding_scorer_rejects_dimension_mismatch() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|text| {
            if text.starts_with("short") {
                Ok(vec![1.0])
            } else {
                Ok(vec![1.0, 0.0])
            }
        });

        let mut scorer = EmbeddingScorer::new(provider);
        scorer.prepare(&rec("a", "long one")).unwrap();
        let err = scorer.prepare(&rec("b", "short one")).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    // ========================================================================
    // Other scorers
    // ========================================================================

    #[test]
    fn test_precomputed_missing_vector() {
        let mut scorer = PrecomputedEmbeddings::new().with("a", vec![1.0, 1.0]);
        assert!(scorer.prepare(&rec("a", "x")).is_ok());
        assert!(scorer.prepare(&rec("b", "y")).is_err());
    }

    #[test]
    fn test_term_overlap_scorer() {
        let mut scorer = TermOverlapScorer::new();
        let a = rec("a", "Enable response caching");
        let b = rec("b", "Response caching layer");
        let c = rec("c", "");
        for r in [&a, &b, &c] {
            scorer.prepare(r).unwrap();
        }
        // {enable, response, caching} vs {response, caching, layer}
        assert!((scorer.score(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(scorer.score(&a, &c), 0.0);
    }

    #[test]
    fn test_fn_scorer() {
        let mut scorer = FnScorer(|a: &Recommendation, b: &Recommendation| {
            if a.title == b.title {
                1.0
            } else {
                0.0
            }
        });
        assert_eq!(scorer.score(&rec("a", "x"), &rec("b", "x")), 1.0);
        assert_eq!(scorer.score(&rec("a", "x"), &rec("b", "y")), 0.0);
    }
}
