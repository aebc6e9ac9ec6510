//! Non-fatal data-quality anomalies.
//!
//! Components never drop a problem silently: every anomaly is returned as a
//! [`Warning`] alongside the result and also logged via `tracing`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A non-fatal anomaly observed while processing recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// No embedding could be obtained; the recommendation was excluded from matching.
    MissingEmbedding {
        /// Recommendation ID.
        recommendation_id: String,
        /// Why the embedding was unavailable.
        reason: String,
    },
    /// A time estimate could not be converted to hours.
    UnparsableTimeEstimate {
        /// Recommendation ID.
        recommendation_id: String,
        /// The raw estimate text.
        value: String,
    },
    /// A recommendation produced no comparison key.
    EmptyKeySet {
        /// Recommendation ID.
        recommendation_id: String,
        /// Engine or source label the recommendation came from.
        source: String,
    },
    /// A dependency cycle left some recommendations unordered.
    DependencyCycle {
        /// IDs forming the cycle, in traversal order.
        recommendation_ids: Vec<String>,
    },
    /// A dependency edge referenced an unknown recommendation.
    DanglingDependency {
        /// Dependent recommendation ID.
        source_id: String,
        /// Missing prerequisite ID.
        target_id: String,
    },
    /// A merged engine recommendation reused an ID already in the pool and was renamed.
    DuplicateRecommendationId {
        /// The ID as the engine reported it.
        original_id: String,
        /// The ID it was given in the pool.
        assigned_id: String,
        /// Engine that produced the recommendation.
        source: String,
    },
}

/// Discriminant used when counting warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// See [`Warning::MissingEmbedding`].
    MissingEmbedding,
    /// See [`Warning::UnparsableTimeEstimate`].
    UnparsableTimeEstimate,
    /// See [`Warning::EmptyKeySet`].
    EmptyKeySet,
    /// See [`Warning::DependencyCycle`].
    DependencyCycle,
    /// See [`Warning::DanglingDependency`].
    DanglingDependency,
    /// See [`Warning::DuplicateRecommendationId`].
    DuplicateRecommendationId,
}

impl Warning {
    /// The kind of this warning.
    pub fn kind(&self) -> WarningKind {
        match self {
            Warning::MissingEmbedding { .. } => WarningKind::MissingEmbedding,
            Warning::UnparsableTimeEstimate { .. } => WarningKind::UnparsableTimeEstimate,
            Warning::EmptyKeySet { .. } => WarningKind::EmptyKeySet,
            Warning::DependencyCycle { .. } => WarningKind::DependencyCycle,
            Warning::DanglingDependency { .. } => WarningKind::DanglingDependency,
            Warning::DuplicateRecommendationId { .. } => WarningKind::DuplicateRecommendationId,
        }
    }
}

/// Count warnings per kind.
pub fn count_by_kind(warnings: &[Warning]) -> BTreeMap<WarningKind, usize> {
    let mut counts = BTreeMap::new();
    for warning in warnings {
        *counts.entry(warning.kind()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_by_kind() {
        let warnings = vec![
            Warning::MissingEmbedding {
                recommendation_id: "a".to_string(),
                reason: "timeout".to_string(),
            },
            Warning::MissingEmbedding {
                recommendation_id: "b".to_string(),
                reason: "timeout".to_string(),
            },
            Warning::UnparsableTimeEstimate {
                recommendation_id: "a".to_string(),
                value: "soon".to_string(),
            },
        ];
        let counts = count_by_kind(&warnings);
        assert_eq!(counts.get(&WarningKind::MissingEmbedding), Some(&2));
        assert_eq!(counts.get(&WarningKind::UnparsableTimeEstimate), Some(&1));
        assert_eq!(counts.get(&WarningKind::DependencyCycle), None);
    }

    #[test]
    fn test_warning_serialize_tagged() {
        let warning = Warning::DependencyCycle {
            recommendation_ids: vec!["a".to_string(), "b".to_string()],
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "dependency_cycle");
        assert_eq!(json["recommendation_ids"][1], "b");
    }
}
