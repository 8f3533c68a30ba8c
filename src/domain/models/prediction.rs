//! Prediction, anomaly and forecast types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::quality::QualityCategory;
use super::trend::TrendDirection;

/// Input to the ensemble: what is known about the response being predicted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub subagent_id: String,
    /// Category scores of the most recent attempt, when one exists.
    #[serde(default)]
    pub category_scores: BTreeMap<QualityCategory, f64>,
    /// Overall score of the most recent attempt, when one exists.
    #[serde(default)]
    pub current_score: Option<f64>,
    /// Attempt number the prediction is for (1-based).
    #[serde(default)]
    pub attempt: u32,
}

impl PredictionRequest {
    pub fn for_subagent(subagent_id: impl Into<String>) -> Self {
        Self {
            subagent_id: subagent_id.into(),
            attempt: 1,
            ..Default::default()
        }
    }
}

/// Output of a single predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model_id: String,
    pub prediction: f64,
    pub confidence: f64,
    pub rationale: String,
    pub contributing_factors: BTreeMap<String, f64>,
    /// Wall-clock cost of the prediction, never reported below 1ms.
    pub processing_time_ms: u64,
}

/// Confidence-weighted combination of several predictors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub final_prediction: f64,
    pub confidence: f64,
    pub contributions: Vec<ModelPrediction>,
    pub consensus_level: f64,
    /// True when no model had enough history and the historical-average
    /// fallback was used.
    pub fallback: bool,
}

/// Which stream an anomaly was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStream {
    QualityScore,
    ValidationTime,
    OperationDuration,
}

impl fmt::Display for MetricStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QualityScore => write!(f, "quality_score"),
            Self::ValidationTime => write!(f, "validation_time"),
            Self::OperationDuration => write!(f, "operation_duration"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl AnomalySeverity {
    /// Severity for an absolute z-score, or `None` when it is not anomalous.
    pub fn from_z_score(z: f64, threshold: f64) -> Option<Self> {
        let z = z.abs();
        if z > 4.0 {
            Some(Self::High)
        } else if z > 3.0 {
            Some(Self::Medium)
        } else if z > threshold {
            Some(Self::Low)
        } else {
            None
        }
    }
}

impl fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A sample that deviates from its stream's rolling statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub stream: MetricStream,
    /// Subagent or operation key of the stream.
    pub key: String,
    /// Position of the sample within the stream.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub rolling_mean: f64,
    pub rolling_stddev: f64,
    pub z_score: f64,
    pub severity: AnomalySeverity,
}

/// Linear projection of a subagent's score series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityForecast {
    pub subagent_id: String,
    pub horizon: usize,
    pub sample_count: usize,
    /// Score change per sample.
    pub slope: f64,
    pub intercept: f64,
    pub projected_scores: Vec<f64>,
    /// Lower/upper bound per projected point.
    pub confidence_intervals: Vec<(f64, f64)>,
    pub residual_std_error: f64,
    pub trend: TrendDirection,
}
