//! Persisted metric records.
//!
//! Three append-only streams feed the analytics layer: quality verdicts,
//! operation performance, and usage. Records are immutable once written and
//! are keyed by subagent (quality, usage) or by operation (performance).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::quality::{QualityAssessment, QualityCategory, ValidationContext};

/// Records that carry a timestamp, used for time-based retention pruning.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// One quality gate verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    pub timestamp: DateTime<Utc>,
    pub subagent_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub quality_score: f64,
    pub passed: bool,
    pub processing_time_ms: u64,
    pub refinement_attempts: u32,
    pub category_scores: BTreeMap<QualityCategory, f64>,
    pub critical_issues: Vec<String>,
    /// Set when the response was judged with experiment variant parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
}

impl QualityMetric {
    /// Build the persisted record for an assessment.
    pub fn from_assessment(assessment: &QualityAssessment, context: &ValidationContext) -> Self {
        Self {
            timestamp: Utc::now(),
            subagent_id: context.subagent_id.clone(),
            session_id: context.session_id.clone(),
            quality_score: assessment.overall_score,
            passed: assessment.passed,
            processing_time_ms: assessment.processing_time_ms,
            refinement_attempts: context.refinement_attempts,
            category_scores: assessment.category_scores.clone(),
            critical_issues: assessment.critical_issues.clone(),
            experiment_id: context.experiment_id.clone(),
        }
    }

    /// Whether the record was judged with the live parameters.
    pub fn is_live(&self) -> bool {
        self.experiment_id.is_none()
    }
}

impl Timestamped for QualityMetric {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Duration and outcome of one internal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub memory_bytes: Option<u64>,
}

impl PerformanceMetric {
    pub fn success(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            duration_ms,
            success: true,
            error_kind: None,
            memory_bytes: None,
        }
    }

    pub fn failure(operation: impl Into<String>, duration_ms: u64, error_kind: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            duration_ms,
            success: false,
            error_kind: Some(error_kind.into()),
            memory_bytes: None,
        }
    }
}

impl Timestamped for PerformanceMetric {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Rough size of a delegated task, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    Moderate,
    Complex,
}

/// One use of a subagent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetric {
    pub timestamp: DateTime<Utc>,
    pub subagent_id: String,
    pub session_id: String,
    pub operation: String,
    pub success: bool,
    #[serde(default)]
    pub task_complexity: Option<TaskComplexity>,
}

impl Timestamped for UsageMetric {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
