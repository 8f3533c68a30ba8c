//! Auto-optimization types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::parameters::ParameterSet;

/// Search bounds for one named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    /// Maximum perturbation per iteration.
    pub step: f64,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Configuration of one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Parameters to search. Empty means "every quality parameter".
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    pub max_iterations: u32,
    pub max_duration_ms: u64,
    /// Stop when the variance of the last `convergence_window` scores drops
    /// below this value.
    pub convergence_epsilon: f64,
    pub convergence_window: usize,
    /// Seed for reproducible searches.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Publish the best parameters when the run improved on its baseline.
    #[serde(default)]
    pub publish: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            max_iterations: 50,
            max_duration_ms: 30_000,
            convergence_epsilon: 1e-5,
            convergence_window: 5,
            seed: None,
            publish: false,
        }
    }
}

/// One evaluated point of the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub iteration: u32,
    pub score: f64,
    pub parameters: ParameterSet,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    MaxIterations,
    Timeout,
    SafetyViolation,
    /// Nothing to evaluate against (empty held-out set).
    NoData,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxIterations => write!(f, "max_iterations"),
            Self::Timeout => write!(f, "timeout"),
            Self::SafetyViolation => write!(f, "safety_violation"),
            Self::NoData => write!(f, "no_data"),
        }
    }
}

/// Outcome of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub iterations: u32,
    pub baseline_score: f64,
    pub best_score: f64,
    pub best_parameters: ParameterSet,
    pub improvement_pct: f64,
    pub convergence_history: Vec<ConvergencePoint>,
    pub termination: TerminationReason,
    /// Reason the search was halted by the safety predicate, if it was.
    pub safety_violation: Option<String>,
    /// Version of the published parameter set, when the result was published.
    pub published_version: Option<u64>,
}

/// Risk classification of a candidate parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Verdict of the safety predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
}

impl SafetyAssessment {
    pub fn is_critical(&self) -> bool {
        self.risk == RiskLevel::Critical
    }
}
