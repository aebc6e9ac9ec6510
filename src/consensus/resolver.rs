//! Consensus resolver: agreement analysis and merge strategies.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};

use super::{
    ConflictAnalysis, ConflictType, ConsensusResult, MergedRecommendation, ModelOutput,
    PairwiseSimilarity, ResolutionLog, ResolutionLogEntry, ResolutionStrategy,
};
use crate::config::ConsensusConfig;
use crate::diagnostics::Warning;
use crate::error::{ConsensusError, PlanResult};
use crate::recommendation::normalize::{comparison_key, jaccard};
use crate::recommendation::Recommendation;

/// Reconciles recommendation sets produced by several engines for the same input.
#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    config: ConsensusConfig,
}

/// Per-engine keyed view of the input.
struct EngineKeys<'a> {
    output: &'a ModelOutput,
    /// (key, recommendation) in engine order; keyless recommendations carry `None`.
    items: Vec<(Option<String>, &'a Recommendation)>,
    keys: BTreeSet<String>,
}

impl ConsensusResolver {
    /// Create a resolver, rejecting an invalid agreement threshold.
    pub fn new(config: ConsensusConfig) -> PlanResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The resolver configuration.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Analyze agreement and merge with the automatically selected strategy.
    ///
    /// - one engine: full agreement, returned unchanged
    /// - two engines: classified by Jaccard similarity of their key sets
    /// - three or more: UNION across all engines, reported as `PARTIAL_AGREEMENT`
    pub fn resolve(&self, outputs: &[ModelOutput]) -> PlanResult<ConsensusResult> {
        validate_outputs(outputs)?;
        let mut warnings = Vec::new();
        let engines = keyed_engines(outputs, &mut warnings);
        let mut analysis = analyze(&engines);

        let strategy = match engines.len() {
            1 => {
                analysis.conflict_type = ConflictType::FullAgreement;
                analysis.similarity_score = 1.0;
                ResolutionStrategy::Consensus
            }
            2 => ResolutionStrategy::for_conflict(analysis.conflict_type),
            n => {
                warn!(
                    engines = n,
                    mean_similarity = analysis.similarity_score,
                    "N-way consensus falls back to UNION"
                );
                analysis.conflict_type = ConflictType::PartialAgreement;
                ResolutionStrategy::Union
            }
        };

        Ok(self.finish(&engines, analysis, strategy, warnings))
    }

    /// Analyze agreement and merge with a caller-chosen strategy.
    pub fn resolve_with_strategy(
        &self,
        outputs: &[ModelOutput],
        strategy: ResolutionStrategy,
    ) -> PlanResult<ConsensusResult> {
        validate_outputs(outputs)?;
        let mut warnings = Vec::new();
        let engines = keyed_engines(outputs, &mut warnings);
        let mut analysis = analyze(&engines);
        if engines.len() == 1 {
            analysis.conflict_type = ConflictType::FullAgreement;
            analysis.similarity_score = 1.0;
        }
        Ok(self.finish(&engines, analysis, strategy, warnings))
    }

    /// [`resolve`](Self::resolve), then append the outcome to `log`.
    pub fn resolve_and_record<L>(
        &self,
        outputs: &[ModelOutput],
        log: &mut L,
    ) -> PlanResult<ConsensusResult>
    where
        L: ResolutionLog + ?Sized,
    {
        let result = self.resolve(outputs)?;
        log.append(&ResolutionLogEntry::from_result(&result))?;
        Ok(result)
    }

    fn finish(
        &self,
        engines: &[EngineKeys<'_>],
        analysis: ConflictAnalysis,
        strategy: ResolutionStrategy,
        warnings: Vec<Warning>,
    ) -> ConsensusResult {
        let merged = match strategy {
            ResolutionStrategy::Consensus => merge_consensus(engines),
            ResolutionStrategy::Union => merge_union(engines),
            ResolutionStrategy::Intersection => merge_intersection(engines),
            ResolutionStrategy::WeightedVote => merge_weighted_vote(engines),
            ResolutionStrategy::HumanReview => merge_human_review(engines),
        };

        let has_consensus = analysis.similarity_score >= self.config.agreement_threshold
            && strategy != ResolutionStrategy::HumanReview;

        info!(
            engines = engines.len(),
            conflict_type = %analysis.conflict_type,
            similarity = analysis.similarity_score,
            strategy = %strategy,
            merged = merged.len(),
            has_consensus = has_consensus,
            "Consensus resolved"
        );

        ConsensusResult {
            has_consensus,
            strategy,
            merged,
            analysis,
            warnings,
        }
    }
}

fn validate_outputs(outputs: &[ModelOutput]) -> PlanResult<()> {
    if outputs.is_empty() {
        return Err(ConsensusError::NoEngines.into());
    }
    let mut names = HashSet::new();
    for output in outputs {
        if output.name.trim().is_empty() {
            return Err(ConsensusError::EmptyEngineName.into());
        }
        if !names.insert(output.name.as_str()) {
            return Err(ConsensusError::DuplicateEngine {
                name: output.name.clone(),
            }
            .into());
        }
        if !(output.confidence.is_finite() && (0.0..=1.0).contains(&output.confidence)) {
            return Err(ConsensusError::InvalidConfidence {
                engine: output.name.clone(),
                value: output.confidence,
            }
            .into());
        }
        for rec in &output.recommendations {
            rec.validate()?;
        }
    }
    Ok(())
}

fn keyed_engines<'a>(outputs: &'a [ModelOutput], warnings: &mut Vec<Warning>) -> Vec<EngineKeys<'a>> {
    outputs
        .iter()
        .map(|output| {
            let mut keys = BTreeSet::new();
            let items = output
                .recommendations
                .iter()
                .map(|rec| {
                    let key = comparison_key(rec);
                    match &key {
                        Some(k) => {
                            keys.insert(k.clone());
                        }
                        None => {
                            warn!(
                                engine = %output.name,
                                recommendation_id = %rec.id,
                                "Recommendation has no comparison key"
                            );
                            warnings.push(Warning::EmptyKeySet {
                                recommendation_id: rec.id.clone(),
                                source: output.name.clone(),
                            });
                        }
                    }
                    (key, rec)
                })
                .collect();
            debug!(engine = %output.name, keys = keys.len(), "Extracted comparison keys");
            EngineKeys {
                output,
                items,
                keys,
            }
        })
        .collect()
}

/// Pairwise Jaccard analysis. With two engines the similarity is their Jaccard;
/// with more it is the mean over all pairs.
fn analyze(engines: &[EngineKeys<'_>]) -> ConflictAnalysis {
    let mut pairwise = Vec::new();
    for (i, a) in engines.iter().enumerate() {
        for b in &engines[i + 1..] {
            pairwise.push(PairwiseSimilarity {
                first: a.output.name.clone(),
                second: b.output.name.clone(),
                similarity: jaccard(&a.keys, &b.keys),
            });
        }
    }

    let similarity_score = if pairwise.is_empty() {
        1.0
    } else {
        pairwise.iter().map(|p| p.similarity).sum::<f64>() / pairwise.len() as f64
    };

    let common: BTreeSet<String> = match engines.split_first() {
        Some((first, rest)) => first
            .keys
            .iter()
            .filter(|k| rest.iter().all(|e| e.keys.contains(*k)))
            .cloned()
            .collect(),
        None => BTreeSet::new(),
    };

    let disjoint_keys: BTreeMap<String, Vec<String>> = engines
        .iter()
        .map(|e| {
            (
                e.output.name.clone(),
                e.keys.difference(&common).cloned().collect(),
            )
        })
        .collect();

    ConflictAnalysis {
        conflict_type: ConflictType::from_similarity(similarity_score),
        similarity_score,
        engines: engines.iter().map(|e| e.output.name.clone()).collect(),
        common_keys: common.into_iter().collect(),
        disjoint_keys,
        pairwise_similarities: pairwise,
    }
}

/// Engines whose key set contains `key`, in engine order.
fn supporters<'a, 'b>(engines: &'a [EngineKeys<'b>], key: &str) -> Vec<&'a EngineKeys<'b>> {
    engines.iter().filter(|e| e.keys.contains(key)).collect()
}

fn tagged(
    rec: &Recommendation,
    source: &EngineKeys<'_>,
    support: &[&EngineKeys<'_>],
    requires_review: bool,
) -> MergedRecommendation {
    let (supporting_models, vote_weight) = if support.is_empty() {
        (vec![source.output.name.clone()], source.output.confidence)
    } else {
        (
            support.iter().map(|e| e.output.name.clone()).collect(),
            support.iter().map(|e| e.output.confidence).sum(),
        )
    };
    MergedRecommendation {
        recommendation: rec.clone(),
        source_engine: source.output.name.clone(),
        vote_count: supporting_models.len(),
        supporting_models,
        vote_weight,
        requires_review,
    }
}

/// First engine's list, unchanged.
fn merge_consensus(engines: &[EngineKeys<'_>]) -> Vec<MergedRecommendation> {
    let Some(first) = engines.first() else {
        return Vec::new();
    };
    first
        .items
        .iter()
        .map(|(key, rec)| {
            let support = key
                .as_deref()
                .map(|k| supporters(engines, k))
                .unwrap_or_default();
            tagged(rec, first, &support, false)
        })
        .collect()
}

/// Every unique key once, first occurrence wins; keyless items are kept.
fn merge_union(engines: &[EngineKeys<'_>]) -> Vec<MergedRecommendation> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for engine in engines {
        for (key, rec) in &engine.items {
            match key {
                Some(k) if !seen.insert(k.clone()) => continue,
                Some(k) => merged.push(tagged(rec, engine, &supporters(engines, k), false)),
                None => merged.push(tagged(rec, engine, &[], false)),
            }
        }
    }
    merged
}

/// Keys present in every engine, first occurrence wins.
fn merge_intersection(engines: &[EngineKeys<'_>]) -> Vec<MergedRecommendation> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for engine in engines {
        for (key, rec) in &engine.items {
            let Some(k) = key else { continue };
            if !engines.iter().all(|e| e.keys.contains(k)) || !seen.insert(k.clone()) {
                continue;
            }
            merged.push(tagged(rec, engine, &supporters(engines, k), false));
        }
    }
    merged
}

/// Keys ranked by summed engine confidence, highest first; ties keep first-seen order.
fn merge_weighted_vote(engines: &[EngineKeys<'_>]) -> Vec<MergedRecommendation> {
    let mut order: Vec<String> = Vec::new();
    let mut ballots: HashMap<String, MergedRecommendation> = HashMap::new();

    for engine in engines {
        let mut voted_here = HashSet::new();
        for (key, rec) in &engine.items {
            let Some(k) = key else { continue };
            if !voted_here.insert(k.as_str()) {
                continue;
            }
            match ballots.get_mut(k) {
                Some(ballot) => {
                    ballot.vote_weight += engine.output.confidence;
                    ballot.vote_count += 1;
                    ballot.supporting_models.push(engine.output.name.clone());
                }
                None => {
                    order.push(k.clone());
                    ballots.insert(
                        k.clone(),
                        MergedRecommendation {
                            recommendation: (*rec).clone(),
                            source_engine: engine.output.name.clone(),
                            supporting_models: vec![engine.output.name.clone()],
                            vote_count: 1,
                            vote_weight: engine.output.confidence,
                            requires_review: false,
                        },
                    );
                }
            }
        }
    }

    let mut merged: Vec<MergedRecommendation> = order
        .into_iter()
        .filter_map(|k| ballots.remove(&k))
        .collect();
    merged.sort_by(|a, b| {
        b.vote_weight
            .partial_cmp(&a.vote_weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

/// Everything from every engine, flagged for review, no deduplication.
fn merge_human_review(engines: &[EngineKeys<'_>]) -> Vec<MergedRecommendation> {
    engines
        .iter()
        .flat_map(|engine| {
            engine
                .items
                .iter()
                .map(move |(_, rec)| tagged(rec, engine, &[], true))
        })
        .collect()
}
