//! Dependency inference and implementation ordering.
//!
//! [`DependencyGraphBuilder`] runs a fixed sequence of stages over one
//! recommendation list:
//!
//! 1. create nodes
//! 2. detect dependencies ([`DependencyDetector`] driven by [`DependencyRules`])
//! 3. drop edges below `min_confidence`
//! 4. build adjacency (`conflicts` edges are recorded but never ordered)
//! 5. compute depth
//! 6. detect cycles (reported, never fatal)
//! 7. Kahn ordering with a `(priority, category)` tie-break
//!
//! Nodes caught in a cycle are left without an implementation order.

mod detector;
mod graph;
pub mod rules;

pub use detector::*;
pub use graph::*;
pub use rules::{ConceptRule, DependencyRules, KeywordRule};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::diagnostics::Warning;
use crate::recommendation::Recommendation;

/// Confidence of an edge found by an explicit dependency keyword.
pub const KEYWORD_CONFIDENCE: f64 = 0.9;
/// Confidence of an edge found through the concept table.
pub const CONCEPT_CONFIDENCE: f64 = 0.7;
/// Confidence of an edge found by title overlap.
pub const OVERLAP_CONFIDENCE: f64 = 0.5;

// ============================================================================
// Edges
// ============================================================================

/// Kind of relationship between two recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// The source cannot start before the target is done.
    Requires,
    /// The source extends work delivered by the target.
    BuildsOn,
    /// The source benefits from the target but does not need it.
    Optional,
    /// Mutually exclusive; never used for ordering.
    Conflicts,
}

impl DependencyType {
    /// Get the dependency type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Requires => "requires",
            DependencyType::BuildsOn => "builds_on",
            DependencyType::Optional => "optional",
            DependencyType::Conflicts => "conflicts",
        }
    }

    /// Whether edges of this type constrain the implementation order.
    pub fn is_ordering(&self) -> bool {
        !matches!(self, DependencyType::Conflicts)
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "requires" => Ok(DependencyType::Requires),
            "builds_on" => Ok(DependencyType::BuildsOn),
            "optional" => Ok(DependencyType::Optional),
            "conflicts" => Ok(DependencyType::Conflicts),
            _ => Err(format!("Unknown dependency type: {}", s)),
        }
    }
}

/// Directed edge: `source_id` depends on `target_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Dependent recommendation.
    pub source_id: String,
    /// Prerequisite recommendation.
    pub target_id: String,
    /// Relationship kind.
    pub dependency_type: DependencyType,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Human-readable explanation.
    pub reason: String,
}

impl Dependency {
    /// Create an edge.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        dependency_type: DependencyType,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            dependency_type,
            confidence,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Graph view of one recommendation.
///
/// `dependents` is derived from the edge list on every build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationNode {
    /// The underlying recommendation.
    pub recommendation: Recommendation,
    /// IDs this node depends on (ordering edges only).
    pub dependencies: Vec<String>,
    /// IDs that depend on this node (ordering edges only).
    pub dependents: Vec<String>,
    /// Length of the longest dependency chain below this node.
    pub depth: usize,
    /// 1-based position in the implementation sequence; `None` when unordered.
    pub implementation_order: Option<usize>,
}

impl RecommendationNode {
    /// Recommendation ID.
    pub fn id(&self) -> &str {
        &self.recommendation.id
    }

    /// Whether the node received a position.
    pub fn is_ordered(&self) -> bool {
        self.implementation_order.is_some()
    }
}

/// One detected cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// IDs in traversal order; the last depends on the first.
    pub ids: Vec<String>,
    /// Titles matching `ids`.
    pub titles: Vec<String>,
}

/// Counters describing one graph build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    /// Nodes in the graph.
    pub total_recommendations: usize,
    /// Edges kept after the confidence filter, conflicts included.
    pub total_dependencies: usize,
    /// Kept edges per type.
    pub dependencies_by_type: BTreeMap<DependencyType, usize>,
    /// Edges discarded for low confidence.
    pub filtered_low_confidence: usize,
    /// Kept edges divided by nodes.
    pub avg_dependencies_per_recommendation: f64,
    /// Deepest ordered node.
    pub max_depth: usize,
    /// Nodes with no prerequisites.
    pub root_count: usize,
    /// Nodes nothing depends on.
    pub leaf_count: usize,
    /// Cycles reported.
    pub cycle_count: usize,
    /// Nodes left without an implementation order.
    pub unordered_count: usize,
}

/// Result of a graph build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Nodes keyed by recommendation ID.
    pub nodes: BTreeMap<String, RecommendationNode>,
    /// Every kept edge in detection order.
    pub dependencies: Vec<Dependency>,
    /// Detected cycles.
    pub cycles: Vec<CycleReport>,
    /// IDs in implementation order.
    pub sequence: Vec<String>,
    /// Build counters.
    pub statistics: GraphStatistics,
    /// Data-quality anomalies.
    pub warnings: Vec<Warning>,
    /// IDs in input order.
    #[serde(default)]
    input_order: Vec<String>,
}

impl DependencyGraph {
    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<&RecommendationNode> {
        self.nodes.get(id)
    }

    /// Implementation position of a recommendation.
    pub fn order_of(&self, id: &str) -> Option<usize> {
        self.nodes.get(id).and_then(|n| n.implementation_order)
    }

    /// Recommendations in implementation order.
    pub fn ordered(&self) -> Vec<&Recommendation> {
        self.sequence
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| &n.recommendation)
            .collect()
    }

    /// IDs left unordered, in input order.
    pub fn unordered(&self) -> Vec<&str> {
        self.input_order
            .iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| !n.is_ordered()))
            .map(String::as_str)
            .collect()
    }

    /// Whether every node received a position.
    pub fn is_fully_ordered(&self) -> bool {
        self.sequence.len() == self.nodes.len()
    }

    /// Ordered IDs grouped by depth, shallowest first.
    pub fn phases(&self) -> Vec<Vec<String>> {
        let mut by_depth: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in &self.sequence {
            if let Some(node) = self.nodes.get(id) {
                by_depth.entry(node.depth).or_default().push(id.clone());
            }
        }
        by_depth.into_values().collect()
    }

    /// Longest dependency chain among ordered nodes, prerequisite first.
    ///
    /// Ties go to the chain ending earliest in the sequence.
    pub fn critical_path(&self) -> Vec<String> {
        let position: HashMap<&str, usize> = self
            .sequence
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut length = vec![1usize; self.sequence.len()];
        let mut previous: Vec<Option<usize>> = vec![None; self.sequence.len()];

        for (i, id) in self.sequence.iter().enumerate() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for dep in &node.dependencies {
                if let Some(&j) = position.get(dep.as_str()) {
                    if length[j] + 1 > length[i] {
                        length[i] = length[j] + 1;
                        previous[i] = Some(j);
                    }
                }
            }
        }

        let mut best: Option<usize> = None;
        for i in 0..length.len() {
            if best.map_or(true, |b| length[i] > length[b]) {
                best = Some(i);
            }
        }

        let mut path = Vec::new();
        let mut cursor = best;
        while let Some(i) = cursor {
            path.push(self.sequence[i].clone());
            cursor = previous[i];
        }
        path.reverse();
        path
    }

    /// Cycles as title sequences.
    pub fn cycle_titles(&self) -> Vec<Vec<String>> {
        self.cycles.iter().map(|c| c.titles.clone()).collect()
    }
}
