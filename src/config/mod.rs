use std::env;

use serde::{Deserialize, Serialize};

use crate::dependency::DependencyRules;
use crate::error::{ensure_unit_interval, PlanError, PlanResult};

/// Planner configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Similarity and consolidation settings
    pub clustering: ClusteringConfig,
    /// Consensus resolution settings
    pub consensus: ConsensusConfig,
    /// Dependency graph settings
    pub dependency: DependencyConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Similarity and consolidation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Minimum score for a pair to be reported as a match
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f64,
    /// Minimum score for a match to join two recommendations into one cluster
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: f64,
    /// Maximum number of implementation steps kept on a merged recommendation
    #[serde(default = "default_max_steps")]
    pub max_merged_steps: usize,
    /// Number of member descriptions quoted in a merged description
    #[serde(default = "default_description_sources")]
    pub description_sources: usize,
    /// Per-description character limit in a merged description
    #[serde(default = "default_description_chars")]
    pub description_chars: usize,
}

fn default_min_threshold() -> f64 {
    0.65
}

fn default_consolidation_threshold() -> f64 {
    0.85
}

fn default_max_steps() -> usize {
    10
}

fn default_description_sources() -> usize {
    3
}

fn default_description_chars() -> usize {
    200
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_threshold: default_min_threshold(),
            consolidation_threshold: default_consolidation_threshold(),
            max_merged_steps: default_max_steps(),
            description_sources: default_description_sources(),
            description_chars: default_description_chars(),
        }
    }
}

impl ClusteringConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_threshold: env_or("PLANNER_MIN_SIMILARITY", defaults.min_threshold),
            consolidation_threshold: env_or(
                "PLANNER_CONSOLIDATION_THRESHOLD",
                defaults.consolidation_threshold,
            ),
            max_merged_steps: env_or("PLANNER_MAX_MERGED_STEPS", defaults.max_merged_steps),
            description_sources: env_or(
                "PLANNER_DESCRIPTION_SOURCES",
                defaults.description_sources,
            ),
            description_chars: env_or("PLANNER_DESCRIPTION_CHARS", defaults.description_chars),
        }
    }

    /// Reject thresholds outside [0, 1].
    pub fn validate(&self) -> PlanResult<()> {
        ensure_unit_interval("min_threshold", self.min_threshold)?;
        ensure_unit_interval("consolidation_threshold", self.consolidation_threshold)?;
        if self.max_merged_steps == 0 {
            return Err(PlanError::Config {
                message: "max_merged_steps must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Consensus resolution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Minimum similarity for a resolution to count as consensus
    #[serde(default = "default_agreement_threshold")]
    pub agreement_threshold: f64,
}

fn default_agreement_threshold() -> f64 {
    0.70
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            agreement_threshold: default_agreement_threshold(),
        }
    }
}

impl ConsensusConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            agreement_threshold: env_or(
                "PLANNER_AGREEMENT_THRESHOLD",
                default_agreement_threshold(),
            ),
        }
    }

    /// Reject thresholds outside [0, 1].
    pub fn validate(&self) -> PlanResult<()> {
        ensure_unit_interval("agreement_threshold", self.agreement_threshold)
    }
}

/// Dependency graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Edges below this confidence are discarded before ordering
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Number of words after a dependency keyword searched for a target title
    #[serde(default = "default_keyword_window")]
    pub keyword_window: usize,
    /// Keyword and concept tables driving detection
    #[serde(default)]
    pub rules: DependencyRules,
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_keyword_window() -> usize {
    8
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            keyword_window: default_keyword_window(),
            rules: DependencyRules::default(),
        }
    }
}

impl DependencyConfig {
    /// Load from environment variables. Rules always start from the built-in tables.
    pub fn from_env() -> Self {
        Self {
            min_confidence: env_or(
                "PLANNER_MIN_DEPENDENCY_CONFIDENCE",
                default_min_confidence(),
            ),
            keyword_window: env_or("PLANNER_KEYWORD_WINDOW", default_keyword_window()),
            rules: DependencyRules::default(),
        }
    }

    /// Reject thresholds outside [0, 1] and an empty keyword window.
    pub fn validate(&self) -> PlanResult<()> {
        ensure_unit_interval("min_confidence", self.min_confidence)?;
        if self.keyword_window == 0 {
            return Err(PlanError::Config {
                message: "keyword_window must be at least 1".to_string(),
            });
        }
        self.rules.validate()
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables and validate it.
    pub fn from_env() -> PlanResult<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Config {
            clustering: ClusteringConfig::from_env(),
            consensus: ConsensusConfig::from_env(),
            dependency: DependencyConfig::from_env(),
            logging: LoggingConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every component section.
    pub fn validate(&self) -> PlanResult<()> {
        self.clustering.validate()?;
        self.consensus.validate()?;
        self.dependency.validate()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
