use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum PlanError {
    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A threshold lies outside [0, 1]
    #[error("Invalid threshold {name}: {value} (must be within [0, 1])")]
    InvalidThreshold {
        /// Threshold name
        name: String,
        /// Offending value
        value: f64,
    },

    /// Input failed validation
    #[error("Validation failed: {field} - {reason}")]
    Validation {
        /// Field that failed
        field: String,
        /// Why it failed
        reason: String,
    },

    /// Consensus input was rejected
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// The resolution log could not be written or read
    #[error("Resolution log error: {0}")]
    Log(#[from] LogError),
}

/// Errors raised before a consensus resolution starts
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// No engine outputs
    #[error("No engine outputs supplied")]
    NoEngines,

    /// An engine has a blank name
    #[error("Engine name must not be empty")]
    EmptyEngineName,

    /// Two outputs share an engine name
    #[error("Duplicate engine: {name}")]
    DuplicateEngine {
        /// Repeated engine name
        name: String,
    },

    /// An engine confidence lies outside [0, 1]
    #[error("Invalid confidence for engine {engine}: {value}")]
    InvalidConfidence {
        /// Engine name
        engine: String,
        /// Offending value
        value: f64,
    },
}

/// Resolution log errors
#[derive(Debug, Error)]
pub enum LogError {
    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Embedding provider errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The provider returned no embedding
    #[error("Embedding unavailable: {message}")]
    Unavailable {
        /// Provider message
        message: String,
    },

    /// A vector has a different length than earlier ones
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length seen first
        expected: usize,
        /// Length of this vector
        actual: usize,
    },
}

impl PlanError {
    /// Build a validation error for the given field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Check that a threshold lies within [0, 1].
pub fn ensure_unit_interval(name: &str, value: f64) -> PlanResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PlanError::InvalidThreshold {
            name: name.to_string(),
            value,
        })
    }
}

/// Result type alias for planner errors
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type alias for resolution log operations
pub type LogResult<T> = Result<T, LogError>;

/// Result type alias for embedding lookups
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;
