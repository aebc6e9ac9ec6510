//! Canonical comparison keys for recommendations.
//!
//! - [`comparison_key`]: one normalized key per recommendation (consensus dedup)
//! - [`term_set`]: lower-cased significant terms (term-overlap similarity)
//! - [`embedding_text`]: the text sent to an embedding provider and used as cache key
//! - [`significant_words`] / [`stem`]: shared with dependency detection

use std::collections::BTreeSet;

use super::Recommendation;

/// Words ignored when extracting significant terms.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "are", "was", "were",
    "will", "should", "could", "would", "can", "its", "our", "your", "their", "all", "any",
    "use", "using", "via", "per", "not", "but", "has", "have", "had", "been", "being", "than",
    "then", "them", "they", "there", "these", "those", "over", "under", "also", "more", "most",
    "such", "each", "other", "some", "when", "where", "which", "while", "who", "what", "how",
    "add", "new",
];

/// Minimum length of a significant word.
const MIN_WORD_LEN: usize = 3;

/// Number of leading characters compared when matching word stems.
const STEM_LEN: usize = 5;

/// Lower-case, trim, and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Key used to decide whether two recommendations describe the same item.
///
/// Uses the normalized title, falling back to the normalized description.
/// Returns `None` when both are blank.
pub fn comparison_key(rec: &Recommendation) -> Option<String> {
    let title = normalize_text(&rec.title);
    if !title.is_empty() {
        return Some(title);
    }
    let description = normalize_text(&rec.description);
    if description.is_empty() {
        None
    } else {
        Some(description)
    }
}

/// Significant terms drawn from title, description and steps.
pub fn term_set(rec: &Recommendation) -> BTreeSet<String> {
    significant_words(&rec.combined_text()).into_iter().collect()
}

/// Text used to obtain (and cache) an embedding for a recommendation.
pub fn embedding_text(rec: &Recommendation) -> String {
    let mut parts = Vec::with_capacity(2 + rec.implementation_steps.len());
    parts.push(rec.title.trim());
    if !rec.description.trim().is_empty() {
        parts.push(rec.description.trim());
    }
    parts.extend(
        rec.implementation_steps
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty()),
    );
    parts.join("\n")
}

/// Lower-cased alphanumeric words of at least three characters, stop words removed.
///
/// Order of first appearance is preserved; duplicates are kept.
pub fn significant_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Crude stem: the first few characters of a lower-cased word.
///
/// Good enough to match "train"/"training" or "deploy"/"deployment".
pub fn stem(word: &str) -> String {
    word.to_lowercase().chars().take(STEM_LEN).collect()
}

/// Jaccard similarity of two sets; 1.0 when both are empty.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Add   Caching\tLayer "), "add caching layer");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_comparison_key_prefers_title() {
        let rec = Recommendation::new("r1", " Add Caching ", "doc").with_description("Other");
        assert_eq!(comparison_key(&rec), Some("add caching".to_string()));
    }

    #[test]
    fn test_comparison_key_falls_back_to_description() {
        let rec = Recommendation::new("r1", "  ", "doc").with_description("Use a CDN");
        assert_eq!(comparison_key(&rec), Some("use a cdn".to_string()));
    }

    #[test]
    fn test_comparison_key_empty() {
        let rec = Recommendation::new("r1", "", "doc");
        assert_eq!(comparison_key(&rec), None);
    }

    #[test]
    fn test_term_set_drops_stop_words_and_short_words() {
        let rec = Recommendation::new("r1", "Add a cache for the API", "doc")
            .with_step("Measure latency");
        let terms = term_set(&rec);
        let expected: BTreeSet<String> = ["cache", "api", "measure", "latency"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(terms, expected);
    }

    #[test]
    fn test_embedding_text_skips_blank_parts() {
        let rec = Recommendation::new("r1", "Title", "doc")
            .with_step("  ")
            .with_step("Step one");
        assert_eq!(embedding_text(&rec), "Title\nStep one");
    }

    #[test]
    fn test_stem_matches_inflections() {
        assert_eq!(stem("train"), stem("training"));
        assert_eq!(stem("Deploy"), stem("deployment"));
        assert_eq!(stem("api"), "api");
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<&str> = ["x", "y"].into_iter().collect();
        let b: BTreeSet<&str> = ["y", "z"].into_iter().collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);

        let empty: BTreeSet<&str> = BTreeSet::new();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
    }
}
