//! A/B experiment types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::parameters::ParameterSet;

/// One arm of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name: String,
    /// Relative share of traffic (normalized across variants).
    pub allocation: f64,
    /// Parameter overrides this variant runs with.
    #[serde(default)]
    pub parameters: ParameterSet,
}

impl VariantConfig {
    pub fn new(name: impl Into<String>, allocation: f64) -> Self {
        Self {
            name: name.into(),
            allocation,
            parameters: ParameterSet::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Definition of a named experiment. The first variant is the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestConfig {
    pub id: String,
    pub description: String,
    pub variants: Vec<VariantConfig>,
    /// Samples required per variant before a verdict can be final.
    pub target_sample_size: usize,
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
}

const fn default_significance_level() -> f64 {
    0.05
}

impl AbTestConfig {
    pub fn new(id: impl Into<String>, variants: Vec<VariantConfig>, target_sample_size: usize) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            variants,
            target_sample_size,
            significance_level: default_significance_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbRecommendation {
    AdoptWinner,
    NoSignificantDifference,
    ContinueCollecting,
    RedesignExperiment,
}

impl fmt::Display for AbRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdoptWinner => write!(f, "adopt_winner"),
            Self::NoSignificantDifference => write!(f, "no_significant_difference"),
            Self::ContinueCollecting => write!(f, "continue_collecting"),
            Self::RedesignExperiment => write!(f, "redesign_experiment"),
        }
    }
}

/// Summary statistics of one variant's observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    pub name: String,
    pub samples: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Verdict of an experiment evaluation.
///
/// The comparison is between the control (first variant) and the best
/// performing challenger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestResult {
    pub experiment_id: String,
    pub variants: Vec<VariantStats>,
    pub control: String,
    pub challenger: String,
    pub p_value: f64,
    /// Cohen's d of challenger versus control.
    pub effect_size: f64,
    /// 95% confidence interval of the mean difference (challenger - control).
    pub confidence_interval: (f64, f64),
    pub winner: Option<String>,
    pub recommendation: AbRecommendation,
    pub evaluated_at: DateTime<Utc>,
}
