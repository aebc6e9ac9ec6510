//! Heuristic dependency detection.
//!
//! For every ordered pair `(source, target)` the heuristics run in order and
//! the first hit wins:
//!
//! 1. explicit keyword followed by a fragment of the target title (0.9)
//! 2. concept table: source concept builds on a concept found in the target (0.7)
//! 3. title overlap: most of the target title appears in the source text (0.5)

use std::collections::HashSet;

use tracing::debug;

use super::rules::{DependencyRules, KeywordRule};
use super::{
    Dependency, DependencyType, CONCEPT_CONFIDENCE, KEYWORD_CONFIDENCE, OVERLAP_CONFIDENCE,
};
use crate::recommendation::normalize::{significant_words, stem};
use crate::recommendation::Recommendation;

/// Shortest stem allowed to match by prefix ("test" / "tests").
const MIN_PREFIX_STEM: usize = 4;

/// Which heuristic produced an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heuristic {
    Keyword,
    Concept,
    Overlap,
}

/// Pre-tokenized view of one recommendation.
struct TextProfile {
    /// Every lower-cased word of the combined text, in order.
    words: Vec<String>,
    /// Stems of the significant words of the combined text.
    stems: HashSet<String>,
    /// Distinct significant words of the title.
    title_fragments: Vec<String>,
}

impl TextProfile {
    fn new(rec: &Recommendation) -> Self {
        let text = rec.combined_text();
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let stems = significant_words(&text).iter().map(|w| stem(w)).collect();

        let mut seen = HashSet::new();
        let title_fragments = significant_words(&rec.title)
            .into_iter()
            .filter(|w| seen.insert(w.clone()))
            .collect();

        Self {
            words,
            stems,
            title_fragments,
        }
    }

    fn contains_word(&self, word: &str) -> bool {
        let wanted = stem(word);
        self.stems.contains(&wanted) || self.stems.iter().any(|s| stems_match(s, &wanted))
    }

    /// Every significant word of the phrase appears somewhere in the text.
    fn contains_phrase(&self, phrase: &str) -> bool {
        let words = significant_words(phrase);
        !words.is_empty() && words.iter().all(|w| self.contains_word(w))
    }

    fn contains_any(&self, phrases: &[String]) -> bool {
        phrases.iter().any(|p| self.contains_phrase(p))
    }
}

fn stems_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_PREFIX_STEM && long.starts_with(short)
}

/// Applies [`DependencyRules`] to pairs of recommendations.
#[derive(Debug, Clone)]
pub struct DependencyDetector<'a> {
    rules: &'a DependencyRules,
    keyword_window: usize,
}

impl<'a> DependencyDetector<'a> {
    /// Create a detector. `keyword_window` is the number of words after a
    /// keyword searched for the target title.
    pub fn new(rules: &'a DependencyRules, keyword_window: usize) -> Self {
        Self {
            rules,
            keyword_window,
        }
    }

    /// Detect the edge `source -> target`, if any.
    pub fn detect(&self, source: &Recommendation, target: &Recommendation) -> Option<Dependency> {
        if source.id == target.id {
            return None;
        }
        let source_profile = TextProfile::new(source);
        let target_profile = TextProfile::new(target);
        self.detect_profiled(source, &source_profile, target, &target_profile)
            .map(|(dep, _)| dep)
    }

    /// Detect edges between every ordered pair, sources in input order.
    ///
    /// When the overlap fallback fires in both directions for a pair, neither
    /// edge is kept: mutual overlap says the items are related, not ordered.
    pub fn detect_all(&self, recommendations: &[Recommendation]) -> Vec<Dependency> {
        let profiles: Vec<TextProfile> = recommendations.iter().map(TextProfile::new).collect();

        let mut found = Vec::new();
        for (i, source) in recommendations.iter().enumerate() {
            for (j, target) in recommendations.iter().enumerate() {
                if i == j || source.id == target.id {
                    continue;
                }
                if let Some((dep, heuristic)) =
                    self.detect_profiled(source, &profiles[i], target, &profiles[j])
                {
                    found.push((i, j, dep, heuristic));
                }
            }
        }

        let overlap_pairs: HashSet<(usize, usize)> = found
            .iter()
            .filter(|(_, _, _, h)| *h == Heuristic::Overlap)
            .map(|(i, j, _, _)| (*i, *j))
            .collect();

        let edges: Vec<Dependency> = found
            .into_iter()
            .filter(|(i, j, _, h)| {
                !(*h == Heuristic::Overlap && overlap_pairs.contains(&(*j, *i)))
            })
            .map(|(_, _, dep, _)| dep)
            .collect();

        debug!(
            recommendations = recommendations.len(),
            edges = edges.len(),
            "Detected dependencies"
        );
        edges
    }

    fn detect_profiled(
        &self,
        source: &Recommendation,
        source_profile: &TextProfile,
        target: &Recommendation,
        target_profile: &TextProfile,
    ) -> Option<(Dependency, Heuristic)> {
        if let Some(rule) = self.keyword_match(source_profile, target_profile) {
            let dep = Dependency::new(
                &source.id,
                &target.id,
                rule.dependency_type,
                KEYWORD_CONFIDENCE,
                format!(
                    "\"{}\" says '{}' followed by \"{}\"",
                    source.title, rule.phrase, target.title
                ),
            );
            return Some((dep, Heuristic::Keyword));
        }

        if let Some((concept, prerequisite)) = self.concept_match(source_profile, target_profile) {
            let dep = Dependency::new(
                &source.id,
                &target.id,
                DependencyType::BuildsOn,
                CONCEPT_CONFIDENCE,
                format!("{} builds on {}", concept, prerequisite),
            );
            return Some((dep, Heuristic::Concept));
        }

        if let Some(ratio) = self.overlap_match(source_profile, target_profile) {
            let dep = Dependency::new(
                &source.id,
                &target.id,
                DependencyType::Optional,
                OVERLAP_CONFIDENCE,
                format!(
                    "{:.0}% of \"{}\" appears in \"{}\"",
                    ratio * 100.0,
                    target.title,
                    source.title
                ),
            );
            return Some((dep, Heuristic::Overlap));
        }

        None
    }

    /// First keyword rule whose phrase is followed, within the window, by at
    /// least half (rounded up) of the target title fragments.
    fn keyword_match(&self, source: &TextProfile, target: &TextProfile) -> Option<&'a KeywordRule> {
        let fragments = &target.title_fragments;
        if fragments.is_empty() {
            return None;
        }
        let needed = fragments.len().div_ceil(2).max(1);

        self.rules.keywords.iter().find(|rule| {
            let phrase: Vec<String> = rule
                .phrase
                .split_whitespace()
                .map(str::to_lowercase)
                .collect();
            if phrase.is_empty() || phrase.len() > source.words.len() {
                return false;
            }

            (0..=source.words.len() - phrase.len())
                .filter(|&start| source.words[start..start + phrase.len()] == phrase[..])
                .any(|start| {
                    let from = start + phrase.len();
                    let to = (from + self.keyword_window).min(source.words.len());
                    let window: Vec<String> = source.words[from..to].iter().map(|w| stem(w)).collect();
                    let hits = fragments
                        .iter()
                        .filter(|f| {
                            let fs = stem(f);
                            window.iter().any(|w| stems_match(w, &fs))
                        })
                        .count();
                    hits >= needed
                })
        })
    }

    /// A concept in the source whose prerequisite concept appears in the
    /// target. Targets that share the source concept are peers and skipped.
    fn concept_match(&self, source: &TextProfile, target: &TextProfile) -> Option<(String, String)> {
        for concept in &self.rules.concepts {
            if concept.prerequisites.is_empty() {
                continue;
            }
            let terms = concept.effective_terms();
            if !source.contains_any(&terms) || target.contains_any(&terms) {
                continue;
            }
            for prerequisite in &concept.prerequisites {
                if target.contains_any(&self.rules.terms_for(prerequisite)) {
                    return Some((concept.name.clone(), prerequisite.clone()));
                }
            }
        }
        None
    }

    /// Share of target title fragments found in the source text, when the
    /// title is long enough and the share reaches the configured ratio.
    fn overlap_match(&self, source: &TextProfile, target: &TextProfile) -> Option<f64> {
        let total = target.title_fragments.len();
        if total <= self.rules.overlap_min_words {
            return None;
        }
        let present = target
            .title_fragments
            .iter()
            .filter(|w| source.contains_word(w))
            .count();
        let ratio = present as f64 / total as f64;
        (ratio >= self.rules.overlap_ratio).then_some(ratio)
    }
}
