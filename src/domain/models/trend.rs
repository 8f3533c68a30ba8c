//! Derived reporting types: trends, insights, health and exports.
//!
//! None of these are persisted; they are recomputed from the analytics store
//! on demand and are advisory only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::metrics::{PerformanceMetric, QualityMetric, UsageMetric};
use super::quality::QualityCategory;

/// Direction of a score series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for InsightSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A human-readable finding about a subagent's quality history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub severity: InsightSeverity,
    pub title: String,
    pub description: String,
    /// Subagent the insight is about (`None` for system-wide insights).
    pub subagent_id: Option<String>,
    /// Supporting value (e.g. the window average), on the `[0, 1]` scale.
    pub value: Option<f64>,
    pub recommendation: Option<String>,
}

/// Windowed quality summary for one subagent (or all of them).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTrend {
    /// `None` when the trend covers every subagent.
    pub subagent_id: Option<String>,
    pub window_days: u32,
    pub sample_count: usize,
    pub score_average: f64,
    pub score_trend: TrendDirection,
    pub success_rate: f64,
    pub refinement_rate: f64,
    pub category_averages: BTreeMap<QualityCategory, f64>,
    pub weak_categories: Vec<QualityCategory>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Snapshot of overall system health derived from the performance stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub total_records: usize,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub checked_at: DateTime<Utc>,
}

/// Raw datasets of the analytics store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsExport {
    pub exported_at: DateTime<Utc>,
    pub quality: BTreeMap<String, Vec<QualityMetric>>,
    pub performance: BTreeMap<String, Vec<PerformanceMetric>>,
    pub usage: BTreeMap<String, Vec<UsageMetric>>,
}

impl AnalyticsExport {
    pub fn total_records(&self) -> usize {
        self.quality.values().map(Vec::len).sum::<usize>()
            + self.performance.values().map(Vec::len).sum::<usize>()
            + self.usage.values().map(Vec::len).sum::<usize>()
    }
}
