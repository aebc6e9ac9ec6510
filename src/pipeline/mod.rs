//! End-to-end planning: consensus, consolidation, ordering.
//!
//! ```text
//! engine outputs ──► ConsensusResolver ──┐
//!                                        ▼
//! recommendations ──────────────► ClusteringEngine ──► DependencyGraphBuilder
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clustering::{ClusteringEngine, ClusteringResult, SimilarityScorer};
use crate::config::Config;
use crate::consensus::{ConsensusResolver, ConsensusResult, ModelOutput, ResolutionLog};
use crate::dependency::{Dependency, DependencyGraph, DependencyGraphBuilder};
use crate::diagnostics::{count_by_kind, Warning, WarningKind};
use crate::error::PlanResult;
use crate::recommendation::Recommendation;

/// Everything a planning run consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    /// Multi-source recommendation pool.
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    /// Outputs of several engines that analyzed the same input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_outputs: Option<Vec<ModelOutput>>,
    /// Caller-declared dependencies, applied on top of detected ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl PlanInput {
    /// Input with a recommendation pool only.
    pub fn new(recommendations: Vec<Recommendation>) -> Self {
        Self {
            recommendations,
            ..Default::default()
        }
    }

    /// Add engine outputs to reconcile.
    pub fn with_engine_outputs(mut self, outputs: Vec<ModelOutput>) -> Self {
        self.engine_outputs = Some(outputs);
        self
    }

    /// Add caller-declared dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Output of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationPlan {
    /// Consensus outcome, when engine outputs were supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusResult>,
    /// Cross-source consolidation.
    pub clustering: ClusteringResult,
    /// Dependency graph and implementation order.
    pub graph: DependencyGraph,
    /// Every warning from every stage, in stage order.
    pub warnings: Vec<Warning>,
    /// `warnings` counted per kind.
    pub warning_counts: BTreeMap<WarningKind, usize>,
}

impl ImplementationPlan {
    /// Recommendations in implementation order.
    pub fn ordered(&self) -> Vec<&Recommendation> {
        self.graph.ordered()
    }

    /// Whether a human must look at something before work starts.
    pub fn requires_review(&self) -> bool {
        self.consensus.as_ref().is_some_and(|c| c.requires_review())
            || !self.graph.cycles.is_empty()
    }
}

/// Chains the three components with one configuration.
#[derive(Debug, Clone)]
pub struct ImplementationPlanner {
    clustering: ClusteringEngine,
    consensus: ConsensusResolver,
    graph: DependencyGraphBuilder,
}

impl ImplementationPlanner {
    /// Create a planner; any invalid threshold fails here.
    pub fn new(config: &Config) -> PlanResult<Self> {
        Ok(Self {
            clustering: ClusteringEngine::new(config.clustering.clone())?,
            consensus: ConsensusResolver::new(config.consensus.clone())?,
            graph: DependencyGraphBuilder::new(config.dependency.clone())?,
        })
    }

    /// Run a full plan.
    ///
    /// Merged consensus output is appended to the pool; an ID already present
    /// is renamed to `<engine>:<id>` and reported. The pool is consolidated
    /// with `scorer` and the consolidated list is ordered. Each consensus
    /// resolution is appended to `log`.
    pub fn plan<S, L>(
        &self,
        input: PlanInput,
        scorer: &mut S,
        log: &mut L,
    ) -> PlanResult<ImplementationPlan>
    where
        S: SimilarityScorer + ?Sized,
        L: ResolutionLog + ?Sized,
    {
        let PlanInput {
            mut recommendations,
            engine_outputs,
            dependencies,
        } = input;
        let mut warnings = Vec::new();

        let consensus = match engine_outputs {
            Some(outputs) => {
                let result = self.consensus.resolve_and_record(&outputs, log)?;
                warnings.extend(result.warnings.iter().cloned());

                let mut known: HashSet<String> =
                    recommendations.iter().map(|r| r.id.clone()).collect();
                for merged in &result.merged {
                    let mut rec = merged.recommendation.clone();
                    if known.contains(&rec.id) {
                        let assigned = unique_id(&known, &merged.source_engine, &rec.id);
                        warn!(
                            recommendation_id = %rec.id,
                            assigned_id = %assigned,
                            engine = %merged.source_engine,
                            "Merged recommendation ID already in the pool; renamed"
                        );
                        warnings.push(Warning::DuplicateRecommendationId {
                            original_id: std::mem::replace(&mut rec.id, assigned.clone()),
                            assigned_id: assigned,
                            source: merged.source_engine.clone(),
                        });
                    }
                    known.insert(rec.id.clone());
                    recommendations.push(rec);
                }
                Some(result)
            }
            None => None,
        };

        let clustering = self.clustering.cluster(&recommendations, scorer)?;
        warnings.extend(clustering.warnings.iter().cloned());

        let consolidated = clustering.clone().into_recommendations();
        let graph = self
            .graph
            .build_with_dependencies(&consolidated, dependencies)?;
        warnings.extend(graph.warnings.iter().cloned());

        let warning_counts = count_by_kind(&warnings);
        info!(
            input = recommendations.len(),
            consolidated = consolidated.len(),
            ordered = graph.sequence.len(),
            warnings = warnings.len(),
            "Implementation plan ready"
        );

        Ok(ImplementationPlan {
            consensus,
            clustering,
            graph,
            warnings,
            warning_counts,
        })
    }
}

/// `<engine>:<id>`, suffixed with `#2`, `#3`, ... until it is free.
fn unique_id(known: &HashSet<String>, engine: &str, id: &str) -> String {
    let base = format!("{}:{}", engine, id);
    if !known.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}#{}", base, n);
        if !known.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::TermOverlapScorer;
    use crate::consensus::InMemoryResolutionLog;
    use crate::error::PlanError;

    #[test]
    fn test_plan_without_engines_skips_consensus() {
        let planner = ImplementationPlanner::new(&Config::default()).unwrap();
        let input = PlanInput::new(vec![
            Recommendation::new("a", "Train model", "doc-1"),
            Recommendation::new("b", "Deploy model", "doc-1")
                .with_description("This requires model training"),
        ]);
        let mut log = InMemoryResolutionLog::new();
        let plan = planner
            .plan(input, &mut TermOverlapScorer::new(), &mut log)
            .unwrap();

        assert!(plan.consensus.is_none());
        assert!(log.is_empty());
        let titles: Vec<&str> = plan.ordered().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Train model", "Deploy model"]);
        assert!(!plan.requires_review());
    }

    #[test]
    fn test_invalid_config_fails_before_planning() {
        let mut config = Config::default();
        config.clustering.consolidation_threshold = 1.5;
        let err = ImplementationPlanner::new(&config).unwrap_err();
        assert!(matches!(err, PlanError::InvalidThreshold { .. }));
    }

    #[test]
    fn test_unique_id_suffixes_when_taken() {
        let known: HashSet<String> = ["r1", "engine-b:r1"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_id(&known, "engine-c", "r1"), "engine-c:r1");
        assert_eq!(unique_id(&known, "engine-b", "r1"), "engine-b:r1#2");
    }

    #[test]
    fn test_input_json_defaults() {
        let input: PlanInput = serde_json::from_str("{}").unwrap();
        assert!(input.recommendations.is_empty());
        assert!(input.engine_outputs.is_none());
        assert!(input.dependencies.is_empty());
    }
}
