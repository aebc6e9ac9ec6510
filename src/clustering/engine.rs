//! Clustering engine: pairwise scoring, union-find grouping, cluster merge.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::similarity::{clamp_score, SimilarityScorer};
use super::union_find::DisjointSet;
use super::{
    ClusteringResult, ClusteringStats, ConsolidatedRecommendation, MatchType, SimilarityMatch,
    Slot, MAX_CONFIDENCE_BOOST, RELATED_THRESHOLD,
};
use crate::config::ClusteringConfig;
use crate::diagnostics::Warning;
use crate::error::PlanResult;
use crate::recommendation::normalize::normalize_text;
use crate::recommendation::{
    format_hours, validate_batch, Priority, Recommendation, UNKNOWN_TIME_ESTIMATE,
};

/// Detects and merges near-duplicate recommendations across sources.
#[derive(Debug, Clone)]
pub struct ClusteringEngine {
    config: ClusteringConfig,
}

impl ClusteringEngine {
    /// Create an engine, rejecting invalid thresholds.
    pub fn new(config: ClusteringConfig) -> PlanResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The engine configuration.
    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Score, cluster and merge a flat list of recommendations.
    ///
    /// Recommendations the scorer cannot prepare are excluded from matching
    /// and returned as passthrough items with a [`Warning::MissingEmbedding`].
    pub fn cluster<S>(
        &self,
        recommendations: &[Recommendation],
        scorer: &mut S,
    ) -> PlanResult<ClusteringResult>
    where
        S: SimilarityScorer + ?Sized,
    {
        validate_batch(recommendations)?;

        let mut warnings = Vec::new();
        let mut stats = ClusteringStats {
            total_recommendations: recommendations.len(),
            ..Default::default()
        };

        let eligible = self.prepare_all(recommendations, scorer, &mut warnings);
        stats.excluded_without_embedding = recommendations.len() - eligible.len();

        let matches = self.find_matches(recommendations, &eligible, scorer, &mut stats);

        let mut forest = DisjointSet::new(recommendations.len());
        let index_of: HashMap<&str, usize> = recommendations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        for m in matches
            .iter()
            .filter(|m| m.score >= self.config.consolidation_threshold)
        {
            if let (Some(&a), Some(&b)) = (
                index_of.get(m.first_id.as_str()),
                index_of.get(m.second_id.as_str()),
            ) {
                forest.union(a, b);
            }
        }

        let groups = forest.groups();
        let mut consolidated = Vec::new();
        let mut passthrough = Vec::new();
        let mut slot_of_first_member: HashMap<usize, Slot> = HashMap::new();
        let taken: HashSet<&str> = recommendations.iter().map(|r| r.id.as_str()).collect();
        let mut ordinal = 0;

        for group in &groups {
            if group.len() < 2 {
                continue;
            }
            let members: Vec<&Recommendation> =
                group.iter().map(|&i| &recommendations[i]).collect();
            let id = next_consolidated_id(&mut ordinal, &taken);
            let merged = self.merge_cluster(id, &members, &mut warnings, &mut stats);
            debug!(
                consolidated_id = %merged.id,
                members = members.len(),
                sources = merged.sources.len(),
                "Merged cluster"
            );
            slot_of_first_member.insert(group[0], Slot::Consolidated(consolidated.len()));
            stats.consolidated_members += group.len();
            consolidated.push(merged);
        }

        let clustered: HashSet<usize> = groups
            .iter()
            .filter(|g| g.len() >= 2)
            .flatten()
            .copied()
            .collect();

        let mut layout = Vec::with_capacity(recommendations.len());
        for (i, rec) in recommendations.iter().enumerate() {
            if let Some(slot) = slot_of_first_member.get(&i) {
                layout.push(*slot);
            } else if !clustered.contains(&i) {
                layout.push(Slot::Passthrough(passthrough.len()));
                passthrough.push(rec.clone());
            }
        }

        stats.clusters = consolidated.len();
        stats.passthrough = passthrough.len();

        info!(
            recommendations = stats.total_recommendations,
            compared_pairs = stats.compared_pairs,
            matches = stats.matches,
            clusters = stats.clusters,
            passthrough = stats.passthrough,
            "Clustering complete"
        );

        Ok(ClusteringResult {
            matches,
            consolidated,
            passthrough,
            warnings,
            stats,
            layout,
        })
    }

    /// Prepare every recommendation; returns the indices eligible for matching.
    fn prepare_all<S>(
        &self,
        recommendations: &[Recommendation],
        scorer: &mut S,
        warnings: &mut Vec<Warning>,
    ) -> Vec<usize>
    where
        S: SimilarityScorer + ?Sized,
    {
        let mut eligible = Vec::with_capacity(recommendations.len());
        for (i, rec) in recommendations.iter().enumerate() {
            match scorer.prepare(rec) {
                Ok(()) => eligible.push(i),
                Err(e) => {
                    warn!(
                        recommendation_id = %rec.id,
                        error = %e,
                        "No embedding available, excluding from matching"
                    );
                    warnings.push(Warning::MissingEmbedding {
                        recommendation_id: rec.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        eligible
    }

    /// Score every eligible cross-source pair, in input order.
    fn find_matches<S>(
        &self,
        recommendations: &[Recommendation],
        eligible: &[usize],
        scorer: &mut S,
        stats: &mut ClusteringStats,
    ) -> Vec<SimilarityMatch>
    where
        S: SimilarityScorer + ?Sized,
    {
        let floor = self.config.min_threshold.max(RELATED_THRESHOLD);
        let mut matches = Vec::new();

        for (pos, &i) in eligible.iter().enumerate() {
            for &j in &eligible[pos + 1..] {
                let (a, b) = (&recommendations[i], &recommendations[j]);
                if a.source_label == b.source_label {
                    continue;
                }
                stats.compared_pairs += 1;

                let score = clamp_score(scorer.score(a, b));
                if score < floor {
                    continue;
                }
                let Some(match_type) = MatchType::from_score(score) else {
                    continue;
                };
                *stats.matches_by_type.entry(match_type).or_insert(0) += 1;
                matches.push(SimilarityMatch {
                    first_id: a.id.clone(),
                    second_id: b.id.clone(),
                    first_source: a.source_label.clone(),
                    second_source: b.source_label.clone(),
                    score,
                    match_type,
                });
            }
        }

        stats.matches = matches.len();
        debug!(
            pairs = stats.compared_pairs,
            matches = matches.len(),
            floor = floor,
            "Pairwise scoring complete"
        );
        matches
    }

    /// Merge the members of one cluster.
    fn merge_cluster(
        &self,
        id: String,
        members: &[&Recommendation],
        warnings: &mut Vec<Warning>,
        stats: &mut ClusteringStats,
    ) -> ConsolidatedRecommendation {
        let mut sources: Vec<String> = Vec::new();
        for member in members {
            if !sources.contains(&member.source_label) {
                sources.push(member.source_label.clone());
            }
        }

        let time_estimate = {
            let mut hours = Vec::new();
            for member in members {
                match member.estimated_hours() {
                    Some(h) => hours.push(h),
                    None if member.time_estimate.trim().is_empty() => {}
                    None => {
                        warn!(
                            recommendation_id = %member.id,
                            value = %member.time_estimate,
                            "Unparsable time estimate"
                        );
                        stats.unparsable_time_estimates += 1;
                        warnings.push(Warning::UnparsableTimeEstimate {
                            recommendation_id: member.id.clone(),
                            value: member.time_estimate.clone(),
                        });
                    }
                }
            }
            if hours.is_empty() {
                UNKNOWN_TIME_ESTIMATE.to_string()
            } else {
                format_hours(hours.iter().sum::<f64>() / hours.len() as f64)
            }
        };

        ConsolidatedRecommendation {
            id,
            title: most_frequent_title(members),
            description: self.merged_description(members, sources.len()),
            implementation_steps: merged_steps(members, self.config.max_merged_steps),
            priority: Priority::highest(members.iter().map(|m| m.priority))
                .unwrap_or_default(),
            time_estimate,
            category: members.iter().find_map(|m| m.category.clone()),
            sources,
            source_ids: members.iter().map(|m| m.id.clone()).collect(),
            confidence_boost: confidence_boost(members.len()),
        }
    }

    fn merged_description(&self, members: &[&Recommendation], source_count: usize) -> String {
        let parts: Vec<String> = members
            .iter()
            .map(|m| m.description.trim())
            .filter(|d| !d.is_empty())
            .take(self.config.description_sources)
            .map(|d| truncate_chars(d, self.config.description_chars))
            .collect();

        if parts.is_empty() {
            format!("Consolidated from {} sources", source_count)
        } else {
            format!(
                "Consolidated from {} sources: {}",
                source_count,
                parts.join(" | ")
            )
        }
    }
}

/// `min(1.0 + 0.1 * (members - 1), 2.0)`.
pub fn confidence_boost(member_count: usize) -> f64 {
    let extra = member_count.saturating_sub(1) as f64;
    (1.0 + 0.1 * extra).min(MAX_CONFIDENCE_BOOST)
}

/// Next `consolidated-NNN` ID not already used by an input recommendation.
fn next_consolidated_id(ordinal: &mut usize, taken: &HashSet<&str>) -> String {
    loop {
        *ordinal += 1;
        let id = format!("consolidated-{:03}", *ordinal);
        if !taken.contains(id.as_str()) {
            return id;
        }
    }
}

/// Most frequent title (compared after normalization); ties go to the first seen.
fn most_frequent_title(members: &[&Recommendation]) -> String {
    let mut counts: Vec<(String, usize, &str)> = Vec::new();
    for member in members {
        let key = normalize_text(&member.title);
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.1 += 1,
            None => counts.push((key, 1, member.title.trim())),
        }
    }

    let mut best: Option<&(String, usize, &str)> = None;
    for entry in &counts {
        if best.map_or(true, |b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    best.map(|(_, _, title)| title.to_string()).unwrap_or_default()
}

/// Union of member steps in first-seen order, deduplicated case-insensitively.
fn merged_steps(members: &[&Recommendation], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut steps = Vec::new();
    for step in members.iter().flat_map(|m| m.implementation_steps.iter()) {
        let key = normalize_text(step);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        steps.push(step.trim().to_string());
        if steps.len() == limit {
            break;
        }
    }
    steps
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::similarity::{FnScorer, PrecomputedEmbeddings};
    use pretty_assertions::assert_eq;

    fn engine() -> ClusteringEngine {
        ClusteringEngine::new(ClusteringConfig::default()).unwrap()
    }

    fn same_title_scorer() -> FnScorer<impl FnMut(&Recommendation, &Recommendation) -> f64> {
        FnScorer(|a: &Recommendation, b: &Recommendation| {
            if normalize_text(&a.title) == normalize_text(&b.title) {
                0.97
            } else {
                0.1
            }
        })
    }

    #[test]
    fn test_new_rejects_invalid_threshold() {
        let config = ClusteringConfig {
            consolidation_threshold: 1.5,
            ..Default::default()
        };
        assert!(ClusteringEngine::new(config).is_err());
    }

    #[test]
    fn test_confidence_boost() {
        assert!((confidence_boost(1) - 1.0).abs() < 1e-9);
        assert!((confidence_boost(2) - 1.1).abs() < 1e-9);
        assert!((confidence_boost(5) - 1.4).abs() < 1e-9);
        assert!((confidence_boost(11) - 2.0).abs() < 1e-9);
        assert!((confidence_boost(50) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_source_pairs_are_never_compared() {
        let recs = vec![
            Recommendation::new("a1", "Add cache", "doc-a"),
            Recommendation::new("a2", "Add cache", "doc-a"),
        ];
        let result = engine().cluster(&recs, &mut same_title_scorer()).unwrap();
        assert!(result.matches.is_empty());
        assert!(result.consolidated.is_empty());
        assert_eq!(result.stats.compared_pairs, 0);
        assert_eq!(result.passthrough.len(), 2);
    }

    #[test]
    fn test_merge_fields() {
        let recs = vec![
            Recommendation::new("a1", "Add cache", "doc-a")
                .with_description("Cache API responses")
                .with_step("Profile endpoints")
                .with_step("Add Redis")
                .with_priority(Priority::Medium)
                .with_time_estimate("4 hours"),
            Recommendation::new("b1", "add cache", "doc-b")
                .with_description("Introduce caching")
                .with_step("add redis")
                .with_step("Set TTLs")
                .with_priority(Priority::Critical)
                .with_time_estimate("2 hours")
                .with_category("Quick Win"),
            Recommendation::new("c1", "Add cache", "doc-c")
                .with_priority(Priority::Low)
                .with_time_estimate("whenever"),
        ];

        let result = engine().cluster(&recs, &mut same_title_scorer()).unwrap();
        assert_eq!(result.consolidated.len(), 1);

        let merged = &result.consolidated[0];
        assert_eq!(merged.id, "consolidated-001");
        assert_eq!(merged.title, "Add cache");
        assert_eq!(
            merged.description,
            "Consolidated from 3 sources: Cache API responses | Introduce caching"
        );
        assert_eq!(
            merged.implementation_steps,
            vec!["Profile endpoints", "Add Redis", "Set TTLs"]
        );
        assert_eq!(merged.priority, Priority::Critical);
        assert_eq!(merged.time_estimate, "3.0 hours");
        assert_eq!(merged.category.as_deref(), Some("Quick Win"));
        assert_eq!(merged.source_ids, vec!["a1", "b1", "c1"]);
        assert!((merged.confidence_boost - 1.2).abs() < 1e-9);

        assert_eq!(result.stats.unparsable_time_estimates, 1);
        assert!(matches!(
            result.warnings.as_slice(),
            [Warning::UnparsableTimeEstimate { .. }]
        ));
    }

    #[test]
    fn test_unknown_time_estimate_when_nothing_parses() {
        let recs = vec![
            Recommendation::new("a1", "Add cache", "doc-a"),
            Recommendation::new("b1", "Add cache", "doc-b").with_time_estimate("TBD"),
        ];
        let result = engine().cluster(&recs, &mut same_title_scorer()).unwrap();
        assert_eq!(result.consolidated[0].time_estimate, "Unknown");
    }

    #[test]
    fn test_steps_truncated_to_limit() {
        let mut a = Recommendation::new("a1", "Refactor", "doc-a");
        let mut b = Recommendation::new("b1", "Refactor", "doc-b");
        for i in 0..8 {
            a = a.with_step(format!("step a{}", i));
            b = b.with_step(format!("step b{}", i));
        }
        let result = engine().cluster(&[a, b], &mut same_title_scorer()).unwrap();
        let steps = &result.consolidated[0].implementation_steps;
        assert_eq!(steps.len(), 10);
        assert_eq!(steps[7], "step a7");
        assert_eq!(steps[9], "step b1");
    }

    #[test]
    fn test_description_truncation() {
        let long = "x".repeat(250);
        let recs = vec![
            Recommendation::new("a1", "T", "doc-a").with_description(long.clone()),
            Recommendation::new("b1", "T", "doc-b").with_description("short"),
        ];
        let result = engine().cluster(&recs, &mut same_title_scorer()).unwrap();
        let description = &result.consolidated[0].description;
        assert!(description.contains(&format!("{}...", "x".repeat(200))));
        assert!(!description.contains(&"x".repeat(201)));
        assert!(description.ends_with("| short"));
    }

    #[test]
    fn test_most_frequent_title_tie_breaks_on_first() {
        let a = Recommendation::new("a", "Alpha", "s1");
        let b = Recommendation::new("b", "Beta", "s2");
        let c = Recommendation::new("c", "beta", "s3");
        let d = Recommendation::new("d", "Gamma", "s4");
        assert_eq!(most_frequent_title(&[&a, &b, &c]), "Beta");
        assert_eq!(most_frequent_title(&[&a, &d]), "Alpha");
    }

    #[test]
    fn test_missing_embedding_excluded_not_dropped() {
        let recs = vec![
            Recommendation::new("a1", "Add cache", "doc-a"),
            Recommendation::new("b1", "Add cache", "doc-b"),
            Recommendation::new("c1", "Add cache", "doc-c"),
        ];
        let mut scorer = PrecomputedEmbeddings::new()
            .with("a1", vec![1.0, 0.0])
            .with("b1", vec![1.0, 0.01]);

        let result = engine().cluster(&recs, &mut scorer).unwrap();
        assert_eq!(result.consolidated.len(), 1);
        assert_eq!(result.consolidated[0].source_ids, vec!["a1", "b1"]);
        assert_eq!(result.passthrough.len(), 1);
        assert_eq!(result.passthrough[0].id, "c1");
        assert_eq!(result.stats.excluded_without_embedding, 1);
        assert!(matches!(
            &result.warnings[0],
            Warning::MissingEmbedding { recommendation_id, .. } if recommendation_id == "c1"
        ));
    }

    #[test]
    fn test_min_threshold_controls_reporting_only() {
        let recs = vec![
            Recommendation::new("a1", "One", "doc-a"),
            Recommendation::new("b1", "Two", "doc-b"),
        ];
        let mut scorer = FnScorer(|_: &Recommendation, _: &Recommendation| 0.8);

        let result = engine().cluster(&recs, &mut scorer).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].match_type, MatchType::Similar);
        assert!(result.consolidated.is_empty());

        let strict = ClusteringEngine::new(ClusteringConfig {
            min_threshold: 0.9,
            ..Default::default()
        })
        .unwrap();
        let result = strict.cluster(&recs, &mut scorer).unwrap();
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_into_recommendations_keeps_input_positions() {
        let recs = vec![
            Recommendation::new("x", "Solo", "doc-a"),
            Recommendation::new("a1", "Add cache", "doc-a"),
            Recommendation::new("y", "Other", "doc-b"),
            Recommendation::new("b1", "Add cache", "doc-b"),
        ];
        let result = engine().cluster(&recs, &mut same_title_scorer()).unwrap();
        let ids: Vec<String> = result
            .into_recommendations()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["x", "consolidated-001", "y"]);
    }

    #[test]
    fn test_consolidated_ids_skip_ids_already_in_input() {
        let recs = vec![
            Recommendation::new("consolidated-001", "Write runbooks", "alpha+beta"),
            Recommendation::new("consolidated-002", "Rotate API keys", "alpha+gamma"),
            Recommendation::new("n1", "Rotate API keys", "delta"),
        ];
        let result = engine().cluster(&recs, &mut same_title_scorer()).unwrap();
        assert_eq!(result.consolidated.len(), 1);
        assert_eq!(result.consolidated[0].id, "consolidated-003");

        let ids: Vec<String> = result
            .into_recommendations()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["consolidated-001", "consolidated-003"]);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let recs = vec![
            Recommendation::new("a", "One", "doc-a"),
            Recommendation::new("a", "Two", "doc-b"),
        ];
        assert!(engine().cluster(&recs, &mut same_title_scorer()).is_err());
    }
}
