//! Graph construction, depth, cycle detection and ordering.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use super::{
    CycleReport, Dependency, DependencyDetector, DependencyGraph, GraphStatistics,
    RecommendationNode,
};
use crate::config::DependencyConfig;
use crate::diagnostics::Warning;
use crate::error::{PlanError, PlanResult};
use crate::recommendation::{category_rank, validate_batch, Recommendation};

/// Builds a [`DependencyGraph`] from a recommendation list.
#[derive(Debug, Clone)]
pub struct DependencyGraphBuilder {
    config: DependencyConfig,
}

/// Index-based adjacency over ordering edges.
struct Adjacency {
    /// `dependencies[i]`: nodes `i` depends on.
    dependencies: Vec<Vec<usize>>,
    /// `dependents[i]`: nodes depending on `i`.
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraphBuilder {
    /// Create a builder, rejecting invalid configuration.
    pub fn new(config: DependencyConfig) -> PlanResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The builder configuration.
    pub fn config(&self) -> &DependencyConfig {
        &self.config
    }

    /// Build the graph from detected dependencies only.
    pub fn build(&self, recommendations: &[Recommendation]) -> PlanResult<DependencyGraph> {
        self.build_with_dependencies(recommendations, Vec::new())
    }

    /// Build the graph from caller-declared edges plus detected ones.
    ///
    /// Declared edges come first, so they win over a detected edge for the
    /// same ordered pair. Declared edges naming unknown IDs are dropped with
    /// a [`Warning::DanglingDependency`].
    pub fn build_with_dependencies(
        &self,
        recommendations: &[Recommendation],
        declared: Vec<Dependency>,
    ) -> PlanResult<DependencyGraph> {
        validate_batch(recommendations)?;
        for dep in &declared {
            if !(dep.confidence.is_finite() && (0.0..=1.0).contains(&dep.confidence)) {
                return Err(PlanError::validation(
                    "dependency.confidence",
                    format!(
                        "{} for {} -> {} must be within [0, 1]",
                        dep.confidence, dep.source_id, dep.target_id
                    ),
                ));
            }
        }

        // Create nodes
        let index: HashMap<&str, usize> = recommendations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        let mut warnings = Vec::new();

        // Detect dependencies
        let detector = DependencyDetector::new(&self.config.rules, self.config.keyword_window);
        let mut candidates = Vec::with_capacity(declared.len());
        for dep in declared {
            if !index.contains_key(dep.source_id.as_str())
                || !index.contains_key(dep.target_id.as_str())
            {
                warn!(
                    source_id = %dep.source_id,
                    target_id = %dep.target_id,
                    "Declared dependency references an unknown recommendation"
                );
                warnings.push(Warning::DanglingDependency {
                    source_id: dep.source_id,
                    target_id: dep.target_id,
                });
                continue;
            }
            if dep.source_id == dep.target_id {
                debug!(id = %dep.source_id, "Ignoring declared self-dependency");
                continue;
            }
            candidates.push(dep);
        }
        candidates.extend(detector.detect_all(recommendations));

        // Filter by confidence, then keep the first edge per ordered pair
        let before = candidates.len();
        candidates.retain(|d| d.confidence >= self.config.min_confidence);
        let filtered_low_confidence = before - candidates.len();

        let mut seen_pairs = HashSet::new();
        candidates.retain(|d| seen_pairs.insert((d.source_id.clone(), d.target_id.clone())));
        debug!(
            kept = candidates.len(),
            filtered = filtered_low_confidence,
            "Filtered dependencies by confidence"
        );

        // Build adjacency
        let adjacency = build_adjacency(recommendations.len(), &index, &candidates);

        // Depth, cycles, order
        let depth = compute_depth(&adjacency);
        let cycles = detect_cycles(&adjacency);
        let order = topological_order(recommendations, &adjacency);

        let cycle_reports: Vec<CycleReport> = cycles
            .iter()
            .map(|cycle| CycleReport {
                ids: cycle.iter().map(|&i| recommendations[i].id.clone()).collect(),
                titles: cycle
                    .iter()
                    .map(|&i| recommendations[i].title.clone())
                    .collect(),
            })
            .collect();
        for report in &cycle_reports {
            warn!(
                cycle = %report.titles.join(" -> "),
                "Dependency cycle detected; its members stay unordered"
            );
            warnings.push(Warning::DependencyCycle {
                recommendation_ids: report.ids.clone(),
            });
        }

        let mut position = vec![None; recommendations.len()];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = Some(pos + 1);
        }

        let nodes: BTreeMap<String, RecommendationNode> = recommendations
            .iter()
            .enumerate()
            .map(|(i, rec)| {
                let node = RecommendationNode {
                    recommendation: rec.clone(),
                    dependencies: ids(recommendations, &adjacency.dependencies[i]),
                    dependents: ids(recommendations, &adjacency.dependents[i]),
                    depth: depth[i],
                    implementation_order: position[i],
                };
                (rec.id.clone(), node)
            })
            .collect();

        let statistics = statistics(
            &candidates,
            &adjacency,
            &depth,
            &position,
            filtered_low_confidence,
            cycle_reports.len(),
        );

        info!(
            recommendations = statistics.total_recommendations,
            dependencies = statistics.total_dependencies,
            cycles = statistics.cycle_count,
            unordered = statistics.unordered_count,
            max_depth = statistics.max_depth,
            "Dependency graph built"
        );

        Ok(DependencyGraph {
            nodes,
            dependencies: candidates,
            cycles: cycle_reports,
            sequence: order
                .iter()
                .map(|&i| recommendations[i].id.clone())
                .collect(),
            statistics,
            warnings,
            input_order: recommendations.iter().map(|r| r.id.clone()).collect(),
        })
    }
}

fn ids(recommendations: &[Recommendation], indices: &[usize]) -> Vec<String> {
    indices
        .iter()
        .map(|&i| recommendations[i].id.clone())
        .collect()
}

fn build_adjacency(n: usize, index: &HashMap<&str, usize>, edges: &[Dependency]) -> Adjacency {
    let mut adjacency = Adjacency {
        dependencies: vec![Vec::new(); n],
        dependents: vec![Vec::new(); n],
    };
    for dep in edges.iter().filter(|d| d.dependency_type.is_ordering()) {
        let (Some(&source), Some(&target)) = (
            index.get(dep.source_id.as_str()),
            index.get(dep.target_id.as_str()),
        ) else {
            continue;
        };
        adjacency.dependencies[source].push(target);
        adjacency.dependents[target].push(source);
    }
    adjacency
}

/// Longest dependency chain per node, propagated from the roots through a
/// work queue. Depth is capped at `n - 1` so cycles terminate.
fn compute_depth(adjacency: &Adjacency) -> Vec<usize> {
    let n = adjacency.dependencies.len();
    let cap = n.saturating_sub(1);
    let mut depth = vec![0usize; n];
    let mut queue: VecDeque<usize> = (0..n)
        .filter(|&i| adjacency.dependencies[i].is_empty())
        .collect();

    while let Some(node) = queue.pop_front() {
        let next = depth[node] + 1;
        if next > cap {
            continue;
        }
        for &dependent in &adjacency.dependents[node] {
            if next > depth[dependent] {
                depth[dependent] = next;
                queue.push_back(dependent);
            }
        }
    }
    depth
}

/// Iterative depth-first search; every back edge to a node on the current
/// path yields one cycle, listed from the re-entered node onward.
fn detect_cycles(adjacency: &Adjacency) -> Vec<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        OnPath,
        Done,
    }

    let n = adjacency.dependencies.len();
    let mut state = vec![State::Unvisited; n];
    let mut cycles = Vec::new();
    let mut seen_cycles: HashSet<Vec<usize>> = HashSet::new();

    for start in 0..n {
        if state[start] != State::Unvisited {
            continue;
        }
        let mut path: Vec<usize> = vec![start];
        let mut cursor: Vec<usize> = vec![0];
        state[start] = State::OnPath;

        while let Some(&node) = path.last() {
            let depth = path.len() - 1;
            let child_index = cursor[depth];
            if let Some(&next) = adjacency.dependencies[node].get(child_index) {
                cursor[depth] += 1;
                match state[next] {
                    State::Unvisited => {
                        state[next] = State::OnPath;
                        path.push(next);
                        cursor.push(0);
                    }
                    State::OnPath => {
                        if let Some(from) = path.iter().position(|&p| p == next) {
                            let cycle = path[from..].to_vec();
                            let mut key = cycle.clone();
                            key.sort_unstable();
                            if seen_cycles.insert(key) {
                                cycles.push(cycle);
                            }
                        }
                    }
                    State::Done => {}
                }
            } else {
                state[node] = State::Done;
                path.pop();
                cursor.pop();
            }
        }
    }

    debug!(cycles = cycles.len(), "Cycle detection finished");
    cycles
}

/// Kahn's algorithm. Among ready nodes the lowest
/// `(priority rank, category rank, input index)` goes first.
/// Nodes in or behind a cycle never become ready.
fn topological_order(recommendations: &[Recommendation], adjacency: &Adjacency) -> Vec<usize> {
    let n = recommendations.len();
    let key = |i: usize| {
        let rec = &recommendations[i];
        Reverse((rec.priority.rank(), category_rank(rec.category.as_deref()), i))
    };

    let mut in_degree: Vec<usize> = adjacency.dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<_> = (0..n).filter(|&i| in_degree[i] == 0).map(key).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse((_, _, node))) = ready.pop() {
        order.push(node);
        for &dependent in &adjacency.dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(key(dependent));
            }
        }
    }
    order
}

fn statistics(
    edges: &[Dependency],
    adjacency: &Adjacency,
    depth: &[usize],
    position: &[Option<usize>],
    filtered_low_confidence: usize,
    cycle_count: usize,
) -> GraphStatistics {
    let n = depth.len();
    let mut dependencies_by_type = BTreeMap::new();
    for dep in edges {
        *dependencies_by_type.entry(dep.dependency_type).or_insert(0) += 1;
    }

    GraphStatistics {
        total_recommendations: n,
        total_dependencies: edges.len(),
        dependencies_by_type,
        filtered_low_confidence,
        avg_dependencies_per_recommendation: if n == 0 {
            0.0
        } else {
            edges.len() as f64 / n as f64
        },
        max_depth: (0..n)
            .filter(|&i| position[i].is_some())
            .map(|i| depth[i])
            .max()
            .unwrap_or(0),
        root_count: adjacency.dependencies.iter().filter(|d| d.is_empty()).count(),
        leaf_count: adjacency.dependents.iter().filter(|d| d.is_empty()).count(),
        cycle_count,
        unordered_count: position.iter().filter(|p| p.is_none()).count(),
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod graph_tests;
