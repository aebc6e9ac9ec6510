//! Clustering engine integration tests
//!
//! Exercise the public clustering surface end to end: scoring through the
//! different scorers, union-find grouping, and cluster merging.

use pretty_assertions::assert_eq;
use recommendation_planner::clustering::{
    cosine_similarity, ClusteringEngine, FnScorer, MatchType, PrecomputedEmbeddings,
    TermOverlapScorer,
};
use recommendation_planner::config::ClusteringConfig;
use recommendation_planner::diagnostics::{Warning, WarningKind};
use recommendation_planner::{Priority, Recommendation};

fn engine() -> ClusteringEngine {
    ClusteringEngine::new(ClusteringConfig::default()).unwrap()
}

/// Score recommendations by the topic suffix of their ID (`x-3` matches `y-3`).
fn topic_scorer(
    matched: f64,
) -> FnScorer<impl FnMut(&Recommendation, &Recommendation) -> f64> {
    FnScorer(move |a: &Recommendation, b: &Recommendation| {
        let topic = |r: &Recommendation| r.id.rsplit('-').next().map(str::to_string);
        if topic(a) == topic(b) {
            matched
        } else {
            0.1
        }
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_five_cross_source_duplicates_consolidate_pairwise() {
    let titles = [
        ("Add caching layer", "Caching layer addition"),
        ("Enable request tracing", "Tracing for requests"),
        ("Rotate API keys", "API key rotation"),
        ("Compress static assets", "Static asset compression"),
        ("Index slow queries", "Slow query indexing"),
    ];
    let mut recs = Vec::new();
    for (i, (x_title, _)) in titles.iter().enumerate() {
        recs.push(Recommendation::new(format!("x-{}", i), *x_title, "engine-x"));
    }
    for (i, (_, y_title)) in titles.iter().enumerate().rev() {
        recs.push(Recommendation::new(format!("y-{}", i), *y_title, "engine-y"));
    }

    let result = engine().cluster(&recs, &mut topic_scorer(0.96)).unwrap();

    assert_eq!(result.consolidated.len(), 5);
    for consolidated in &result.consolidated {
        assert_eq!(consolidated.source_ids.len(), 2);
        assert_eq!(consolidated.sources, vec!["engine-x", "engine-y"]);
        assert!((consolidated.confidence_boost - 1.1).abs() < 1e-9);
    }
    assert_eq!(result.consolidated[0].source_ids, vec!["x-0", "y-0"]);
    assert_eq!(result.matches.len(), 5);
    assert!(result
        .matches
        .iter()
        .all(|m| m.match_type == MatchType::Duplicate));
    assert!(result.passthrough.is_empty());
    assert_eq!(result.stats.compared_pairs, 25);
}

#[test]
fn test_transitive_chain_forms_one_cluster() {
    let recs = vec![
        Recommendation::new("a", "Cache sessions", "source-a"),
        Recommendation::new("b", "Session cache", "source-b"),
        Recommendation::new("c", "Cache user sessions", "source-c"),
    ];
    let mut scorer = FnScorer(|x: &Recommendation, y: &Recommendation| {
        let mut pair = [x.id.as_str(), y.id.as_str()];
        pair.sort_unstable();
        match pair {
            ["a", "b"] | ["b", "c"] => 0.9,
            _ => 0.1,
        }
    });

    let result = engine().cluster(&recs, &mut scorer).unwrap();

    assert_eq!(result.consolidated.len(), 1);
    let cluster = &result.consolidated[0];
    assert_eq!(cluster.source_ids, vec!["a", "b", "c"]);
    assert_eq!(cluster.member_count(), 3);
    assert!((cluster.confidence_boost - 1.2).abs() < 1e-9);
    assert!(cluster.description.starts_with("Consolidated from 3 sources"));
}

#[test]
fn test_same_source_pairs_are_never_matched() {
    let recs = vec![
        Recommendation::new("a", "Rotate keys", "doc"),
        Recommendation::new("b", "Rotate keys", "doc"),
    ];
    let result = engine().cluster(&recs, &mut topic_scorer(1.0)).unwrap();
    assert!(result.matches.is_empty());
    assert!(!result.has_consolidations());
    assert_eq!(result.stats.compared_pairs, 0);
}

#[test]
fn test_consolidating_twice_adds_nothing() {
    let recs = vec![
        Recommendation::new("a-1", "Add caching layer", "alpha").with_priority(Priority::High),
        Recommendation::new("b-1", "Add caching layer", "beta"),
        Recommendation::new("a-2", "Rotate API keys", "alpha"),
        Recommendation::new("c-2", "Rotate API keys", "gamma"),
        Recommendation::new("d-3", "Write runbooks", "delta"),
    ];
    let engine = engine();
    let first = engine.cluster(&recs, &mut TermOverlapScorer::new()).unwrap();
    assert_eq!(first.consolidated.len(), 2);

    let flattened = first.into_recommendations();
    let ids: Vec<&str> = flattened.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["consolidated-001", "consolidated-002", "d-3"]);
    assert_eq!(flattened[0].priority, Priority::High);
    assert_eq!(flattened[0].source_label, "alpha+beta");

    let second = engine
        .cluster(&flattened, &mut TermOverlapScorer::new())
        .unwrap();
    assert!(second.consolidated.is_empty());
    assert_eq!(second.passthrough.len(), 3);
}

// ============================================================================
// Embeddings
// ============================================================================

#[test]
fn test_cosine_similarity_is_symmetric() {
    let vectors: Vec<Vec<f32>> = vec![
        vec![1.0, 0.0, 0.5],
        vec![0.2, 0.9, 0.1],
        vec![-1.0, 0.3, 0.0],
        vec![0.0, 0.0, 0.0],
        vec![3.0, 1.0, 2.0],
    ];
    for a in &vectors {
        for b in &vectors {
            assert_eq!(cosine_similarity(a, b), cosine_similarity(b, a));
            let score = cosine_similarity(a, b);
            assert!((0.0..=1.0).contains(&score));
        }
    }
}

#[test]
fn test_precomputed_embeddings_cluster() {
    let recs = vec![
        Recommendation::new("a", "Add caching layer", "alpha").with_time_estimate("2 hours"),
        Recommendation::new("b", "Introduce a cache", "beta").with_time_estimate("4 hours"),
        Recommendation::new("c", "Write runbooks", "gamma"),
    ];
    let mut embeddings = PrecomputedEmbeddings::new()
        .with("a", vec![1.0, 0.0, 0.0])
        .with("b", vec![0.99, 0.1, 0.0])
        .with("c", vec![0.0, 0.0, 1.0]);

    let result = engine().cluster(&recs, &mut embeddings).unwrap();

    assert_eq!(result.consolidated.len(), 1);
    assert_eq!(result.consolidated[0].source_ids, vec!["a", "b"]);
    assert_eq!(result.consolidated[0].time_estimate, "3.0 hours");
    assert_eq!(result.passthrough.len(), 1);
    assert_eq!(result.passthrough[0].id, "c");
}

#[test]
fn test_missing_embedding_is_excluded_not_dropped() {
    let recs = vec![
        Recommendation::new("a", "Add caching layer", "alpha"),
        Recommendation::new("b", "Add caching layer", "beta"),
    ];
    let mut embeddings = PrecomputedEmbeddings::new().with("a", vec![1.0, 0.0]);

    let result = engine().cluster(&recs, &mut embeddings).unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(result.passthrough.len(), 2);
    assert_eq!(result.stats.excluded_without_embedding, 1);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind(), WarningKind::MissingEmbedding);
    assert!(matches!(
        &result.warnings[0],
        Warning::MissingEmbedding { recommendation_id, .. } if recommendation_id == "b"
    ));
}

#[test]
fn test_invalid_thresholds_fail_fast() {
    let config = ClusteringConfig {
        consolidation_threshold: 1.01,
        ..ClusteringConfig::default()
    };
    assert!(ClusteringEngine::new(config).is_err());
}
