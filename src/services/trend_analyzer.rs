//! Quality trends, insights and system health.
//!
//! Everything here is recomputed from the analytics store on demand. The
//! analyzer never writes, so a report can be produced at any time without
//! coordinating with the assess/refine path.

use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::models::quality::to_display_points;
use crate::domain::models::{
    HealthStatus, Insight, InsightSeverity, QualityCategory, QualityMetric, QualityTrend,
    SystemHealth, TrendDirection,
};
use crate::services::analytics_store::AnalyticsStore;
use crate::services::statistics::mean;

/// Difference between the first and last third that counts as movement
/// (5 points on the display scale).
pub const TREND_DELTA: f64 = 0.05;

const LOW_SUCCESS_RATE: f64 = 0.70;
const CRITICAL_SUCCESS_RATE: f64 = 0.40;
const EXCELLENT_AVERAGE: f64 = 0.90;
const EXCELLENT_SUCCESS_RATE: f64 = 0.95;
const HIGH_REFINEMENT_RATE: f64 = 0.50;
const WEAK_CATEGORY_AVERAGE: f64 = 0.70;
const SLOW_VALIDATION_MS: f64 = 1_000.0;

const DEGRADED_ERROR_RATE: f64 = 0.10;
const UNHEALTHY_ERROR_RATE: f64 = 0.25;
const DEGRADED_RESPONSE_MS: f64 = 10_000.0;
const HEALTH_WINDOW_HOURS: i64 = 24;

/// Window used by [`TrendAnalyzer::insights`].
pub const DEFAULT_INSIGHT_WINDOW_DAYS: u32 = 30;

/// Direction of a chronological score series.
///
/// Compares the mean of the first third of the samples with the mean of the
/// last third. Fewer than three samples are always stable.
pub fn trend_direction(scores: &[f64]) -> TrendDirection {
    if scores.len() < 3 {
        return TrendDirection::Stable;
    }
    let third = (scores.len() / 3).max(1);
    let (Some(first), Some(last)) = (
        mean(&scores[..third]),
        mean(&scores[scores.len() - third..]),
    ) else {
        return TrendDirection::Stable;
    };

    let delta = last - first;
    if delta > TREND_DELTA {
        TrendDirection::Improving
    } else if delta < -TREND_DELTA {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

pub struct TrendAnalyzer {
    store: Arc<AnalyticsStore>,
}

impl TrendAnalyzer {
    pub fn new(store: Arc<AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Quality summary over the last `days` days, for one subagent or for
    /// every subagent combined.
    pub async fn trends(&self, subagent_id: Option<&str>, days: u32) -> QualityTrend {
        let since = Utc::now() - Duration::days(i64::from(days));
        let records = self.store.quality_since(subagent_id, since).await;
        summarize(subagent_id, days, &records)
    }

    /// Findings for one subagent, or for every subagent plus system health,
    /// most severe first.
    pub async fn insights(&self, subagent_id: Option<&str>) -> Vec<Insight> {
        let mut insights = match subagent_id {
            Some(id) => self.trends(Some(id), DEFAULT_INSIGHT_WINDOW_DAYS).await.insights,
            None => {
                let mut all = Vec::new();
                for id in self.store.subagents().await {
                    all.extend(self.trends(Some(&id), DEFAULT_INSIGHT_WINDOW_DAYS).await.insights);
                }
                all.extend(health_insight(&self.system_health().await));
                all
            }
        };
        insights.sort_by(|a, b| b.severity.cmp(&a.severity));
        insights
    }

    /// Health derived from the performance stream of the last 24 hours.
    #[allow(clippy::cast_precision_loss)]
    pub async fn system_health(&self) -> SystemHealth {
        let since = Utc::now() - Duration::hours(HEALTH_WINDOW_HOURS);
        let recent = self.store.performance_since(since).await;
        let total_records = self.store.record_counts().await.total();

        let (error_rate, avg_response_time_ms) = if recent.is_empty() {
            (0.0, 0.0)
        } else {
            let failures = recent.iter().filter(|m| !m.success).count();
            let durations: Vec<f64> = recent.iter().map(|m| m.duration_ms as f64).collect();
            (
                failures as f64 / recent.len() as f64,
                mean(&durations).unwrap_or(0.0),
            )
        };

        let status = if error_rate > UNHEALTHY_ERROR_RATE {
            HealthStatus::Unhealthy
        } else if error_rate > DEGRADED_ERROR_RATE || avg_response_time_ms > DEGRADED_RESPONSE_MS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        tracing::debug!(
            status = %status,
            total_records,
            error_rate,
            avg_response_time_ms,
            "System health computed"
        );

        SystemHealth {
            status,
            total_records,
            error_rate,
            avg_response_time_ms,
            checked_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Window statistics that feed the insight rules.
struct WindowStats {
    sample_count: usize,
    score_average: f64,
    score_trend: TrendDirection,
    success_rate: f64,
    refinement_rate: f64,
    category_averages: BTreeMap<QualityCategory, f64>,
    weak_categories: Vec<(QualityCategory, f64)>,
    avg_processing_ms: f64,
}

#[allow(clippy::cast_precision_loss)]
fn window_stats(records: &[QualityMetric]) -> WindowStats {
    let n = records.len();
    let scores: Vec<f64> = records.iter().map(|m| m.quality_score).collect();
    let rate = |count: usize| if n == 0 { 0.0 } else { count as f64 / n as f64 };

    let mut per_category: BTreeMap<QualityCategory, Vec<f64>> = BTreeMap::new();
    for record in records {
        for (category, score) in &record.category_scores {
            per_category.entry(*category).or_default().push(*score);
        }
    }
    let category_averages: BTreeMap<QualityCategory, f64> = per_category
        .iter()
        .filter_map(|(c, scores)| mean(scores).map(|m| (*c, m)))
        .collect();

    let mut weak_categories: Vec<(QualityCategory, f64)> = category_averages
        .iter()
        .filter(|(_, avg)| **avg < WEAK_CATEGORY_AVERAGE)
        .map(|(c, avg)| (*c, *avg))
        .collect();
    weak_categories.sort_by(|a, b| a.1.total_cmp(&b.1));

    let durations: Vec<f64> = records.iter().map(|m| m.processing_time_ms as f64).collect();

    WindowStats {
        sample_count: n,
        score_average: mean(&scores).unwrap_or(0.0),
        score_trend: trend_direction(&scores),
        success_rate: rate(records.iter().filter(|m| m.passed).count()),
        refinement_rate: rate(records.iter().filter(|m| m.refinement_attempts > 0).count()),
        category_averages,
        weak_categories,
        avg_processing_ms: mean(&durations).unwrap_or(0.0),
    }
}

fn summarize(subagent_id: Option<&str>, days: u32, records: &[QualityMetric]) -> QualityTrend {
    let stats = window_stats(records);
    let insights = build_insights(subagent_id, days, &stats);

    let mut recommendations: Vec<String> = Vec::new();
    for recommendation in insights.iter().filter_map(|i| i.recommendation.as_ref()) {
        if !recommendations.contains(recommendation) {
            recommendations.push(recommendation.clone());
        }
    }

    QualityTrend {
        subagent_id: subagent_id.map(str::to_string),
        window_days: days,
        sample_count: stats.sample_count,
        score_average: stats.score_average,
        score_trend: stats.score_trend,
        success_rate: stats.success_rate,
        refinement_rate: stats.refinement_rate,
        category_averages: stats.category_averages,
        weak_categories: stats.weak_categories.iter().map(|(c, _)| *c).collect(),
        insights,
        recommendations,
    }
}

// ---------------------------------------------------------------------------
// Insight rules
// ---------------------------------------------------------------------------

fn insight(
    severity: InsightSeverity,
    title: &str,
    description: String,
    subagent_id: Option<&str>,
    value: f64,
    recommendation: Option<&str>,
) -> Insight {
    Insight {
        severity,
        title: title.to_string(),
        description,
        subagent_id: subagent_id.map(str::to_string),
        value: Some(value),
        recommendation: recommendation.map(str::to_string),
    }
}

fn build_insights(subagent_id: Option<&str>, days: u32, stats: &WindowStats) -> Vec<Insight> {
    if stats.sample_count == 0 {
        return Vec::new();
    }
    let who = subagent_id.unwrap_or("all subagents");
    let mut insights = Vec::new();

    if stats.success_rate < LOW_SUCCESS_RATE {
        let severity = if stats.success_rate < CRITICAL_SUCCESS_RATE {
            InsightSeverity::Critical
        } else {
            InsightSeverity::Warning
        };
        insights.push(insight(
            severity,
            "Low Success Rate",
            format!(
                "{who} passed {:.0}% of {} assessments in the last {days} days",
                stats.success_rate * 100.0,
                stats.sample_count
            ),
            subagent_id,
            stats.success_rate,
            Some("Review the recurring critical issues and tighten the task prompt"),
        ));
    }

    match stats.score_trend {
        TrendDirection::Declining => insights.push(insight(
            InsightSeverity::Warning,
            "Quality Score Declining",
            format!(
                "{who} is trending down with an average score of {} over the last {days} days",
                to_display_points(stats.score_average)
            ),
            subagent_id,
            stats.score_average,
            Some("Compare recent responses with earlier passing ones to find the regression"),
        )),
        TrendDirection::Improving => insights.push(insight(
            InsightSeverity::Info,
            "Quality Improving",
            format!(
                "{who} is trending up with an average score of {}",
                to_display_points(stats.score_average)
            ),
            subagent_id,
            stats.score_average,
            None,
        )),
        TrendDirection::Stable => {}
    }

    if stats.score_average >= EXCELLENT_AVERAGE && stats.success_rate >= EXCELLENT_SUCCESS_RATE {
        insights.push(insight(
            InsightSeverity::Info,
            "Excellent Performance",
            format!(
                "{who} averages {} with a {:.0}% pass rate",
                to_display_points(stats.score_average),
                stats.success_rate * 100.0
            ),
            subagent_id,
            stats.score_average,
            None,
        ));
    }

    if stats.refinement_rate > HIGH_REFINEMENT_RATE {
        insights.push(insight(
            InsightSeverity::Warning,
            "High Refinement Rate",
            format!(
                "{:.0}% of {who}'s responses needed refinement",
                stats.refinement_rate * 100.0
            ),
            subagent_id,
            stats.refinement_rate,
            Some("Fold the most common refinement feedback into the initial prompt"),
        ));
    }

    for (category, average) in &stats.weak_categories {
        insights.push(insight(
            InsightSeverity::Warning,
            &format!("Weak Category: {category}"),
            format!(
                "{who} averages {} in {category}",
                to_display_points(*average)
            ),
            subagent_id,
            *average,
            Some(category_recommendation(*category)),
        ));
    }

    if stats.avg_processing_ms > SLOW_VALIDATION_MS {
        insights.push(insight(
            InsightSeverity::Info,
            "Slow Validation",
            format!(
                "Assessments for {who} take {:.0} ms on average",
                stats.avg_processing_ms
            ),
            subagent_id,
            stats.avg_processing_ms,
            Some("Check for very large responses or a slow custom rule"),
        ));
    }

    insights
}

fn category_recommendation(category: QualityCategory) -> &'static str {
    match category {
        QualityCategory::Format => "Ask for structured output with headings or lists",
        QualityCategory::Completeness => "Restate every requirement explicitly in the prompt",
        QualityCategory::Specificity => "Ask for concrete files, values and identifiers",
        QualityCategory::StructuredOperationsValidity => {
            "Provide a JSON example of the expected structured output"
        }
        QualityCategory::TaskCompletion => "Require a closing summary of the completed work",
    }
}

fn health_insight(health: &SystemHealth) -> Option<Insight> {
    let (severity, title) = match health.status {
        HealthStatus::Healthy => return None,
        HealthStatus::Degraded => (InsightSeverity::Warning, "System Degraded"),
        HealthStatus::Unhealthy => (InsightSeverity::Critical, "System Unhealthy"),
    };
    Some(Insight {
        severity,
        title: title.to_string(),
        description: format!(
            "Error rate {:.1}% with {:.0} ms average response time",
            health.error_rate * 100.0,
            health.avg_response_time_ms
        ),
        subagent_id: None,
        value: Some(health.error_rate),
        recommendation: Some("Inspect failing operations in the performance log".to_string()),
    })
}
