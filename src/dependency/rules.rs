//! Data-driven pattern tables for dependency detection.
//!
//! Both tables are plain serde data so callers can replace or extend them
//! without touching the graph code.

use serde::{Deserialize, Serialize};

use super::DependencyType;
use crate::error::{ensure_unit_interval, PlanError, PlanResult};

/// A phrase that announces a dependency on whatever follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// Lower-case phrase, e.g. `"depends on"`.
    pub phrase: String,
    /// Edge type emitted when the phrase matches.
    pub dependency_type: DependencyType,
}

impl KeywordRule {
    /// Create a rule.
    pub fn new(phrase: impl Into<String>, dependency_type: DependencyType) -> Self {
        Self {
            phrase: phrase.into(),
            dependency_type,
        }
    }
}

/// A known concept and the concepts it usually builds on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRule {
    /// Concept name, e.g. `"model_deployment"`.
    pub name: String,
    /// Phrases signalling the concept. When empty, the name with
    /// underscores replaced by spaces is used.
    #[serde(default)]
    pub terms: Vec<String>,
    /// Names of prerequisite concepts.
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

impl ConceptRule {
    /// Create a concept.
    pub fn new(name: &str, terms: &[&str], prerequisites: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Phrases signalling the concept, never empty.
    pub fn effective_terms(&self) -> Vec<String> {
        if self.terms.is_empty() {
            vec![self.name.replace('_', " ")]
        } else {
            self.terms.clone()
        }
    }
}

/// Keyword and concept tables plus the title-overlap fallback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRules {
    /// Checked in order; the first matching phrase decides the edge type.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<KeywordRule>,
    /// Concept prerequisite table.
    #[serde(default = "default_concepts")]
    pub concepts: Vec<ConceptRule>,
    /// The overlap fallback applies only to target titles with more
    /// significant words than this.
    #[serde(default = "default_overlap_min_words")]
    pub overlap_min_words: usize,
    /// Share of target title words that must appear in the source text.
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f64,
}

fn default_keywords() -> Vec<KeywordRule> {
    use DependencyType::*;
    vec![
        KeywordRule::new("requires", Requires),
        KeywordRule::new("require", Requires),
        KeywordRule::new("depends on", Requires),
        KeywordRule::new("dependent on", Requires),
        KeywordRule::new("prerequisite", Requires),
        KeywordRule::new("needs", Requires),
        KeywordRule::new("after completing", Requires),
        KeywordRule::new("builds on", BuildsOn),
        KeywordRule::new("build on", BuildsOn),
        KeywordRule::new("extends", BuildsOn),
        KeywordRule::new("based on", BuildsOn),
        KeywordRule::new("leverages", BuildsOn),
        KeywordRule::new("optionally", Optional),
        KeywordRule::new("could use", Optional),
        KeywordRule::new("benefits from", Optional),
        KeywordRule::new("complements", Optional),
        KeywordRule::new("conflicts with", Conflicts),
        KeywordRule::new("incompatible with", Conflicts),
        KeywordRule::new("replaces", Conflicts),
        KeywordRule::new("instead of", Conflicts),
    ]
}

fn default_concepts() -> Vec<ConceptRule> {
    vec![
        ConceptRule::new(
            "data_preparation",
            &["data preparation", "prepare data", "data cleaning", "data collection", "collect data"],
            &[],
        ),
        ConceptRule::new(
            "feature_engineering",
            &["feature engineering", "feature extraction", "feature store"],
            &["data_preparation"],
        ),
        ConceptRule::new(
            "model_training",
            &["model training", "train model", "fine tune", "training pipeline"],
            &["data_preparation", "feature_engineering"],
        ),
        ConceptRule::new(
            "model_evaluation",
            &["model evaluation", "evaluate model", "benchmark suite", "validation set"],
            &["model_training"],
        ),
        ConceptRule::new(
            "model_deployment",
            &["model deployment", "deploy model", "model serving", "serve model"],
            &["model_training", "model_evaluation"],
        ),
        ConceptRule::new(
            "model_monitoring",
            &["model monitoring", "drift detection", "monitor model"],
            &["model_deployment"],
        ),
        ConceptRule::new(
            "api_endpoint",
            &["api endpoint", "rest api", "graphql api"],
            &["authentication"],
        ),
        ConceptRule::new(
            "authentication",
            &["authentication", "access control", "oauth"],
            &[],
        ),
        ConceptRule::new(
            "continuous_deployment",
            &["continuous deployment", "release pipeline", "deployment pipeline"],
            &["automated_testing"],
        ),
        ConceptRule::new(
            "automated_testing",
            &["automated tests", "test suite", "integration tests", "unit tests"],
            &[],
        ),
        ConceptRule::new(
            "dashboard",
            &["dashboard", "reporting view"],
            &["metrics_collection"],
        ),
        ConceptRule::new(
            "metrics_collection",
            &["metrics collection", "collect metrics", "telemetry"],
            &[],
        ),
    ]
}

fn default_overlap_min_words() -> usize {
    2
}

fn default_overlap_ratio() -> f64 {
    0.6
}

impl Default for DependencyRules {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            concepts: default_concepts(),
            overlap_min_words: default_overlap_min_words(),
            overlap_ratio: default_overlap_ratio(),
        }
    }
}

impl DependencyRules {
    /// Parse a rule set from JSON; omitted tables fall back to the built-ins.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        let rules: Self = serde_json::from_str(json).map_err(|e| PlanError::Config {
            message: format!("invalid dependency rules: {}", e),
        })?;
        rules.validate()?;
        Ok(rules)
    }

    /// Reject blank phrases, blank concept names, and an overlap ratio outside [0, 1].
    pub fn validate(&self) -> PlanResult<()> {
        if let Some(rule) = self.keywords.iter().find(|r| r.phrase.trim().is_empty()) {
            return Err(PlanError::validation(
                "rules.keywords",
                format!("blank phrase for {}", rule.dependency_type),
            ));
        }
        if self.concepts.iter().any(|c| c.name.trim().is_empty()) {
            return Err(PlanError::validation("rules.concepts", "blank concept name"));
        }
        ensure_unit_interval("overlap_ratio", self.overlap_ratio)
    }

    /// Look up a concept by name.
    pub fn concept(&self, name: &str) -> Option<&ConceptRule> {
        self.concepts.iter().find(|c| c.name == name)
    }

    /// Phrases for a concept name; unknown names fall back to the name itself.
    pub fn terms_for(&self, name: &str) -> Vec<String> {
        match self.concept(name) {
            Some(rule) => rule.effective_terms(),
            None => vec![name.replace('_', " ")],
        }
    }
}
