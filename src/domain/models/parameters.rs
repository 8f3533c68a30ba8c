//! Tunable quality gate parameters.
//!
//! [`QualityParameters`] is the unit of atomic publication: the validator
//! takes one snapshot per assessment, and the optimizer replaces the whole
//! set at once. [`ParameterSet`] is the flat, named view the optimizer and
//! experiments work on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::quality::QualityCategory;

/// Flat named parameter values (`weight.format`, `threshold.default`, ...).
pub type ParameterSet = BTreeMap<String, f64>;

/// Parameter name of the default pass threshold.
pub const PARAM_DEFAULT_THRESHOLD: &str = "threshold.default";
/// Parameter name of the per-category hard floor.
pub const PARAM_HARD_FLOOR: &str = "threshold.hard_floor";

/// Parameter name of a category weight.
pub fn weight_param(category: QualityCategory) -> String {
    format!("weight.{}", category.as_str())
}

/// Relative weight of each category in the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoryWeights {
    #[serde(default = "default_weight")]
    pub format: f64,
    #[serde(default = "default_weight")]
    pub completeness: f64,
    #[serde(default = "default_weight")]
    pub specificity: f64,
    #[serde(default = "default_weight")]
    pub structured_operations_validity: f64,
    #[serde(default = "default_weight")]
    pub task_completion: f64,
}

const fn default_weight() -> f64 {
    1.0
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            format: default_weight(),
            completeness: default_weight(),
            specificity: default_weight(),
            structured_operations_validity: default_weight(),
            task_completion: default_weight(),
        }
    }
}

impl CategoryWeights {
    pub fn get(&self, category: QualityCategory) -> f64 {
        match category {
            QualityCategory::Format => self.format,
            QualityCategory::Completeness => self.completeness,
            QualityCategory::Specificity => self.specificity,
            QualityCategory::StructuredOperationsValidity => self.structured_operations_validity,
            QualityCategory::TaskCompletion => self.task_completion,
        }
    }

    pub fn set(&mut self, category: QualityCategory, value: f64) {
        match category {
            QualityCategory::Format => self.format = value,
            QualityCategory::Completeness => self.completeness = value,
            QualityCategory::Specificity => self.specificity = value,
            QualityCategory::StructuredOperationsValidity => {
                self.structured_operations_validity = value;
            }
            QualityCategory::TaskCompletion => self.task_completion = value,
        }
    }

    pub fn total(&self) -> f64 {
        QualityCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// Largest weight share of any single category.
    pub fn max_share(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 1.0;
        }
        QualityCategory::ALL
            .iter()
            .map(|c| self.get(*c) / total)
            .fold(0.0, f64::max)
    }

    /// Weighted average of the given category scores.
    ///
    /// Categories missing from `scores` are skipped; returns 0 when nothing
    /// carries positive weight.
    pub fn weighted_average(&self, scores: &BTreeMap<QualityCategory, f64>) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (category, score) in scores {
            let weight = self.get(*category).max(0.0);
            weighted += weight * score;
            total += weight;
        }
        if total > 0.0 {
            weighted / total
        } else {
            0.0
        }
    }
}

/// Inclusive band adaptive thresholds are clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub min: f64,
    pub max: f64,
}

impl Default for ThresholdBand {
    fn default() -> Self {
        Self { min: 0.60, max: 0.90 }
    }
}

impl ThresholdBand {
    /// Clip `value` into the band. Never panics, even on an invalid band.
    pub fn clip(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The complete live parameter set of the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityParameters {
    /// Monotonically increasing publication counter.
    pub version: u64,
    pub weights: CategoryWeights,
    /// Threshold used when a subagent has too little passing history.
    pub default_threshold: f64,
    pub hard_floor: f64,
    pub threshold_band: ThresholdBand,
    pub published_at: DateTime<Utc>,
}

impl Default for QualityParameters {
    fn default() -> Self {
        Self {
            version: 0,
            weights: CategoryWeights::default(),
            default_threshold: 0.75,
            hard_floor: 0.50,
            threshold_band: ThresholdBand::default(),
            published_at: Utc::now(),
        }
    }
}

impl QualityParameters {
    /// Flatten into named parameters.
    pub fn to_parameter_set(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        for category in QualityCategory::ALL {
            set.insert(weight_param(category), self.weights.get(category));
        }
        set.insert(PARAM_DEFAULT_THRESHOLD.to_string(), self.default_threshold);
        set.insert(PARAM_HARD_FLOOR.to_string(), self.hard_floor);
        set
    }

    /// Copy with the named parameters applied. Unknown names are ignored.
    pub fn with_parameter_set(&self, set: &ParameterSet) -> Self {
        let mut next = self.clone();
        for (name, value) in set {
            if let Some(category) = name
                .strip_prefix("weight.")
                .and_then(QualityCategory::from_str_opt)
            {
                next.weights.set(category, *value);
            } else if name == PARAM_DEFAULT_THRESHOLD {
                next.default_threshold = *value;
            } else if name == PARAM_HARD_FLOOR {
                next.hard_floor = *value;
            }
        }
        next
    }
}
