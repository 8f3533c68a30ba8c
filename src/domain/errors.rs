//! Domain errors for the Overseer quality system.

use thiserror::Error;

/// Domain-level errors that can occur in the Overseer system.
///
/// Only [`DomainError::ExhaustedRefinement`] and the structural variants ever
/// reach a caller of the primary assess/refine path. Storage, prediction and
/// optimization failures are logged and degraded by the services that hit
/// them.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Quality gate rejected response for {subagent_id}: score {score:.3} below threshold {threshold:.3}")]
    ValidationFailure {
        subagent_id: String,
        score: f64,
        threshold: f64,
    },

    #[error("Refinement exhausted after {attempts} attempts (best score {best_score:.3})")]
    ExhaustedRefinement { attempts: u32, best_score: f64 },

    #[error("Prediction unavailable: {0}")]
    PredictionUnavailable(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Safety violation on candidate parameters: {0}")]
    SafetyViolation(String),

    #[error("At capacity: {in_flight} of {limit} task slots in use")]
    AtCapacity { limit: usize, in_flight: usize },

    #[error("Task cancelled: {0}")]
    Cancelled(String),

    #[error("Sub-agent invocation failed: {0}")]
    SubagentFailure(String),

    #[error("Sub-agent invocation timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Invalid experiment: {0}")]
    InvalidExperiment(String),

    #[error("Validation failed: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Short machine-readable kind, used as `error_kind` in performance metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationFailure { .. } => "validation_failure",
            Self::ExhaustedRefinement { .. } => "exhausted_refinement",
            Self::PredictionUnavailable(_) => "prediction_unavailable",
            Self::StorageFailure(_) => "storage_failure",
            Self::SafetyViolation(_) => "safety_violation",
            Self::AtCapacity { .. } => "at_capacity",
            Self::Cancelled(_) => "cancelled",
            Self::SubagentFailure(_) => "subagent_failure",
            Self::Timeout(_) => "timeout",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::ExperimentNotFound(_) => "experiment_not_found",
            Self::InvalidExperiment(_) => "invalid_experiment",
            Self::InvalidInput(_) => "invalid_input",
            Self::SerializationError(_) => "serialization_error",
        }
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
