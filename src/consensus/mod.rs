//! Multi-engine consensus resolution.
//!
//! When several analysis engines examined the same input, their
//! recommendation sets are compared by Jaccard similarity over normalized
//! comparison keys, the disagreement is classified, and the sets are merged
//! with a strategy chosen from the classification.
//!
//! Every resolution can be appended to a caller-owned [`ResolutionLog`].

mod history;
mod resolver;

pub use history::*;
pub use resolver::*;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::Warning;
use crate::recommendation::Recommendation;

/// Lower bound of `FULL_AGREEMENT`.
pub const FULL_AGREEMENT_THRESHOLD: f64 = 0.90;
/// Lower bound of `PARTIAL_AGREEMENT`.
pub const PARTIAL_AGREEMENT_THRESHOLD: f64 = 0.70;
/// Lower bound of `SIGNIFICANT_DISAGREEMENT`.
pub const SIGNIFICANT_DISAGREEMENT_THRESHOLD: f64 = 0.50;

// ============================================================================
// Classification
// ============================================================================

/// Level of agreement between engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Similarity >= 0.90.
    FullAgreement,
    /// Similarity in [0.70, 0.90).
    PartialAgreement,
    /// Similarity in [0.50, 0.70).
    SignificantDisagreement,
    /// Similarity < 0.50.
    CompleteDisagreement,
}

impl ConflictType {
    /// Classify a similarity score.
    pub fn from_similarity(similarity: f64) -> Self {
        match similarity {
            s if s >= FULL_AGREEMENT_THRESHOLD => ConflictType::FullAgreement,
            s if s >= PARTIAL_AGREEMENT_THRESHOLD => ConflictType::PartialAgreement,
            s if s >= SIGNIFICANT_DISAGREEMENT_THRESHOLD => ConflictType::SignificantDisagreement,
            _ => ConflictType::CompleteDisagreement,
        }
    }

    /// Get the conflict type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::FullAgreement => "FULL_AGREEMENT",
            ConflictType::PartialAgreement => "PARTIAL_AGREEMENT",
            ConflictType::SignificantDisagreement => "SIGNIFICANT_DISAGREEMENT",
            ConflictType::CompleteDisagreement => "COMPLETE_DISAGREEMENT",
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How engine outputs are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    /// Engines agree; take the first engine's list.
    Consensus,
    /// Keep every unique item.
    Union,
    /// Keep items every engine proposed.
    Intersection,
    /// Rank items by summed engine confidence.
    WeightedVote,
    /// Hand every item to a human, undeduplicated.
    HumanReview,
}

impl ResolutionStrategy {
    /// Strategy picked automatically for a two-engine classification.
    pub fn for_conflict(conflict: ConflictType) -> Self {
        match conflict {
            ConflictType::FullAgreement => ResolutionStrategy::Consensus,
            ConflictType::PartialAgreement => ResolutionStrategy::Union,
            ConflictType::SignificantDisagreement => ResolutionStrategy::HumanReview,
            ConflictType::CompleteDisagreement => ResolutionStrategy::HumanReview,
        }
    }

    /// Get the strategy name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Consensus => "CONSENSUS",
            ResolutionStrategy::Union => "UNION",
            ResolutionStrategy::Intersection => "INTERSECTION",
            ResolutionStrategy::WeightedVote => "WEIGHTED_VOTE",
            ResolutionStrategy::HumanReview => "HUMAN_REVIEW",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "CONSENSUS" => Ok(ResolutionStrategy::Consensus),
            "UNION" => Ok(ResolutionStrategy::Union),
            "INTERSECTION" => Ok(ResolutionStrategy::Intersection),
            "WEIGHTED_VOTE" => Ok(ResolutionStrategy::WeightedVote),
            "HUMAN_REVIEW" => Ok(ResolutionStrategy::HumanReview),
            _ => Err(format!("Unknown resolution strategy: {}", s)),
        }
    }
}

// ============================================================================
// Inputs and Outputs
// ============================================================================

/// Recommendations produced by one analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Engine name, unique within a resolution call.
    pub name: String,
    /// Recommendations in the engine's order.
    pub recommendations: Vec<Recommendation>,
    /// Vote weight in [0, 1].
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl ModelOutput {
    /// Create an output with full confidence.
    pub fn new(name: impl Into<String>, recommendations: Vec<Recommendation>) -> Self {
        Self {
            name: name.into(),
            recommendations,
            confidence: default_confidence(),
        }
    }

    /// Set the vote weight.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A merged recommendation with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecommendation {
    /// The kept recommendation.
    pub recommendation: Recommendation,
    /// Engine the kept object came from.
    pub source_engine: String,
    /// Engines that proposed the same key, in engine order.
    pub supporting_models: Vec<String>,
    /// Number of engines that proposed the same key.
    pub vote_count: usize,
    /// Summed confidence of supporting engines.
    pub vote_weight: f64,
    /// Whether a human must decide on this item.
    pub requires_review: bool,
}

/// Similarity between two engines' key sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseSimilarity {
    /// First engine.
    pub first: String,
    /// Second engine.
    pub second: String,
    /// Jaccard similarity of their key sets.
    pub similarity: f64,
}

/// Classification of agreement between engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    /// Agreement class.
    pub conflict_type: ConflictType,
    /// Overall similarity in [0, 1].
    pub similarity_score: f64,
    /// Participating engines, in input order.
    pub engines: Vec<String>,
    /// Keys every engine proposed, sorted.
    pub common_keys: Vec<String>,
    /// Per engine, the keys not shared by all engines, sorted.
    pub disjoint_keys: BTreeMap<String, Vec<String>>,
    /// Similarity of every engine pair.
    pub pairwise_similarities: Vec<PairwiseSimilarity>,
}

/// Outcome of one resolution call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// True when similarity meets the agreement threshold and no review is needed.
    pub has_consensus: bool,
    /// Strategy used to build `merged`.
    pub strategy: ResolutionStrategy,
    /// Merged recommendations with provenance.
    pub merged: Vec<MergedRecommendation>,
    /// Agreement analysis.
    pub analysis: ConflictAnalysis,
    /// Data-quality anomalies.
    pub warnings: Vec<Warning>,
}

impl ConsensusResult {
    /// Whether any merged item needs a human decision.
    pub fn requires_review(&self) -> bool {
        self.strategy == ResolutionStrategy::HumanReview
            || self.merged.iter().any(|m| m.requires_review)
    }

    /// The merged recommendations without provenance.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.merged.iter().map(|m| m.recommendation.clone()).collect()
    }
}

/// One record in the append-only resolution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionLogEntry {
    /// Unique entry ID.
    pub id: String,
    /// When the resolution happened.
    pub timestamp: DateTime<Utc>,
    /// Agreement class.
    pub conflict_type: ConflictType,
    /// Overall similarity.
    pub similarity_score: f64,
    /// Participating engines.
    pub engines: Vec<String>,
    /// Number of merged recommendations.
    pub merged_count: usize,
    /// Strategy used.
    pub strategy: ResolutionStrategy,
    /// Whether a human must review the result.
    pub requires_review: bool,
    /// Whether consensus was reached.
    pub has_consensus: bool,
}

impl ResolutionLogEntry {
    /// Summarize a result, stamped with the current time.
    pub fn from_result(result: &ConsensusResult) -> Self {
        Self {
            id: format!("resolution_{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            conflict_type: result.analysis.conflict_type,
            similarity_score: result.analysis.similarity_score,
            engines: result.analysis.engines.clone(),
            merged_count: result.merged.len(),
            strategy: result.strategy,
            requires_review: result.requires_review(),
            has_consensus: result.has_consensus,
        }
    }
}
