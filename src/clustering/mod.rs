//! Cross-source similarity detection and consolidation.
//!
//! - [`similarity`]: pairwise scorers (cosine over embeddings, term overlap, injected functions)
//! - [`union_find`]: disjoint-set forest used to group transitive matches
//! - [`ClusteringEngine`]: scores every cross-source pair, clusters matches
//!   above the consolidation threshold, and merges each cluster
//!
//! Recommendations that share a `source_label` are never compared.

mod engine;
pub mod similarity;
pub mod union_find;

pub use engine::*;
pub use similarity::{
    cosine_similarity, EmbeddingProvider, EmbeddingScorer, FnScorer, PrecomputedEmbeddings,
    SimilarityScorer, TermOverlapScorer,
};
pub use union_find::DisjointSet;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Warning;
use crate::recommendation::{Priority, Recommendation};

/// Lower bound of the `duplicate` band.
pub const DUPLICATE_THRESHOLD: f64 = 0.95;
/// Lower bound of the `very_similar` band.
pub const VERY_SIMILAR_THRESHOLD: f64 = 0.85;
/// Lower bound of the `similar` band.
pub const SIMILAR_THRESHOLD: f64 = 0.75;
/// Lower bound of the `related` band; anything below is unmatched.
pub const RELATED_THRESHOLD: f64 = 0.65;

/// Maximum confidence boost of a consolidated recommendation.
pub const MAX_CONFIDENCE_BOOST: f64 = 2.0;

/// Similarity band of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Score >= 0.95.
    Duplicate,
    /// Score >= 0.85.
    VerySimilar,
    /// Score >= 0.75.
    Similar,
    /// Score >= 0.65.
    Related,
}

impl MatchType {
    /// Band for a score, or `None` when the score is below every band.
    pub fn from_score(score: f64) -> Option<Self> {
        match score {
            s if s >= DUPLICATE_THRESHOLD => Some(MatchType::Duplicate),
            s if s >= VERY_SIMILAR_THRESHOLD => Some(MatchType::VerySimilar),
            s if s >= SIMILAR_THRESHOLD => Some(MatchType::Similar),
            s if s >= RELATED_THRESHOLD => Some(MatchType::Related),
            _ => None,
        }
    }

    /// Get the band name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Duplicate => "duplicate",
            MatchType::VerySimilar => "very_similar",
            MatchType::Similar => "similar",
            MatchType::Related => "related",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pairwise comparison between two recommendations from different sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// ID of the earlier recommendation (input order).
    pub first_id: String,
    /// ID of the later recommendation.
    pub second_id: String,
    /// Source of the first recommendation.
    pub first_source: String,
    /// Source of the second recommendation.
    pub second_source: String,
    /// Similarity in [0, 1].
    pub score: f64,
    /// Band derived from `score`.
    pub match_type: MatchType,
}

/// A cluster of cross-source near-duplicates merged into one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRecommendation {
    /// Generated ID (`consolidated-001`, ...), stable for identical input.
    pub id: String,
    /// Most frequent member title.
    pub title: String,
    /// Quoted member descriptions prefixed with the source count.
    pub description: String,
    /// Deduplicated union of member steps.
    pub implementation_steps: Vec<String>,
    /// Highest member priority.
    pub priority: Priority,
    /// Mean of parseable member estimates, or "Unknown".
    pub time_estimate: String,
    /// First member category, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Distinct member sources in first-seen order.
    pub sources: Vec<String>,
    /// IDs of every contributing recommendation, in input order.
    pub source_ids: Vec<String>,
    /// `min(1.0 + 0.1 * (members - 1), 2.0)`.
    pub confidence_boost: f64,
}

impl ConsolidatedRecommendation {
    /// Number of contributing recommendations.
    pub fn member_count(&self) -> usize {
        self.source_ids.len()
    }

    /// Flatten into a plain recommendation for downstream components.
    ///
    /// The source label lists the distinct member sources, sorted and joined with `+`.
    pub fn to_recommendation(&self) -> Recommendation {
        let mut sources = self.sources.clone();
        sources.sort();
        Recommendation {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            implementation_steps: self.implementation_steps.clone(),
            priority: self.priority,
            source_label: sources.join("+"),
            time_estimate: self.time_estimate.clone(),
            category: self.category.clone(),
        }
    }
}

/// Counters describing one clustering run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringStats {
    /// Recommendations received.
    pub total_recommendations: usize,
    /// Cross-source pairs scored.
    pub compared_pairs: usize,
    /// Matches recorded.
    pub matches: usize,
    /// Matches per band.
    pub matches_by_type: BTreeMap<MatchType, usize>,
    /// Clusters with two or more members.
    pub clusters: usize,
    /// Recommendations absorbed into a cluster.
    pub consolidated_members: usize,
    /// Recommendations passed through unchanged.
    pub passthrough: usize,
    /// Recommendations excluded from matching for lack of an embedding.
    pub excluded_without_embedding: usize,
    /// Member time estimates that could not be parsed.
    pub unparsable_time_estimates: usize,
}

/// Position of an output item relative to the input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Consolidated(usize),
    Passthrough(usize),
}

/// Output of a clustering run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Every cross-source match at or above the reporting threshold.
    pub matches: Vec<SimilarityMatch>,
    /// One entry per multi-member cluster.
    pub consolidated: Vec<ConsolidatedRecommendation>,
    /// Recommendations not absorbed into any cluster, in input order.
    pub passthrough: Vec<Recommendation>,
    /// Data-quality anomalies.
    pub warnings: Vec<Warning>,
    /// Run counters.
    pub stats: ClusteringStats,
    #[serde(skip)]
    layout: Vec<Slot>,
}

impl ClusteringResult {
    /// Consolidated and passthrough items as one plain recommendation list.
    ///
    /// Each consolidated item takes the input position of its first member.
    pub fn into_recommendations(self) -> Vec<Recommendation> {
        if self.layout.is_empty() {
            let mut out: Vec<Recommendation> = self
                .consolidated
                .iter()
                .map(ConsolidatedRecommendation::to_recommendation)
                .collect();
            out.extend(self.passthrough);
            return out;
        }

        self.layout
            .iter()
            .map(|slot| match *slot {
                Slot::Consolidated(i) => self.consolidated[i].to_recommendation(),
                Slot::Passthrough(i) => self.passthrough[i].clone(),
            })
            .collect()
    }

    /// Whether the run merged anything.
    pub fn has_consolidations(&self) -> bool {
        !self.consolidated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_bands() {
        assert_eq!(MatchType::from_score(1.0), Some(MatchType::Duplicate));
        assert_eq!(MatchType::from_score(0.95), Some(MatchType::Duplicate));
        assert_eq!(MatchType::from_score(0.94), Some(MatchType::VerySimilar));
        assert_eq!(MatchType::from_score(0.85), Some(MatchType::VerySimilar));
        assert_eq!(MatchType::from_score(0.80), Some(MatchType::Similar));
        assert_eq!(MatchType::from_score(0.65), Some(MatchType::Related));
        assert_eq!(MatchType::from_score(0.6499), None);
    }

    #[test]
    fn test_match_type_serde() {
        let json = serde_json::to_string(&MatchType::VerySimilar).unwrap();
        assert_eq!(json, "\"very_similar\"");
        assert_eq!(MatchType::Related.to_string(), "related");
    }

    #[test]
    fn test_consolidated_to_recommendation_sorts_sources() {
        let consolidated = ConsolidatedRecommendation {
            id: "consolidated-001".to_string(),
            title: "Cache".to_string(),
            description: "d".to_string(),
            implementation_steps: vec![],
            priority: Priority::High,
            time_estimate: "Unknown".to_string(),
            category: None,
            sources: vec!["zeta".to_string(), "alpha".to_string()],
            source_ids: vec!["z1".to_string(), "a1".to_string()],
            confidence_boost: 1.1,
        };
        let rec = consolidated.to_recommendation();
        assert_eq!(rec.source_label, "alpha+zeta");
        assert_eq!(rec.id, "consolidated-001");
        assert_eq!(consolidated.member_count(), 2);
    }
}
