//! Quality gate.
//!
//! Runs the rule registry over one response, aggregates the category scores
//! with the live weights and decides pass/fail against the subagent's
//! adaptive threshold and the per-category hard floor. Every verdict is
//! recorded to the analytics store before it is returned.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::domain::models::quality::{clamp_score, to_display_points};
use crate::domain::models::{
    PerformanceMetric, QualityAssessment, QualityMetric, QualityParameters, QualityRuleResult,
    ValidationContext,
};
use crate::services::analytics_store::AnalyticsStore;
use crate::services::prediction::adaptive_threshold;
use crate::services::rules::{category_scores, RuleRegistry};

pub const ASSESS_OPERATION: &str = "assess";

pub struct QualityValidator {
    rules: RuleRegistry,
    store: Arc<AnalyticsStore>,
    parameters: watch::Receiver<Arc<QualityParameters>>,
    min_passing_samples: usize,
}

impl QualityValidator {
    pub fn new(
        rules: RuleRegistry,
        store: Arc<AnalyticsStore>,
        parameters: watch::Receiver<Arc<QualityParameters>>,
        min_passing_samples: usize,
    ) -> Self {
        Self {
            rules,
            store,
            parameters,
            min_passing_samples,
        }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Snapshot of the parameters the next assessment will use.
    pub fn parameters(&self) -> Arc<QualityParameters> {
        self.parameters.borrow().clone()
    }

    /// Assess a response with the live parameters.
    pub async fn assess(&self, response: &str, context: &ValidationContext) -> QualityAssessment {
        let params = self.parameters();
        self.assess_with_parameters(response, context, &params).await
    }

    /// Assess a response with an explicit parameter set.
    ///
    /// The set is fixed for the whole assessment.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn assess_with_parameters(
        &self,
        response: &str,
        context: &ValidationContext,
        params: &QualityParameters,
    ) -> QualityAssessment {
        let started = Instant::now();

        let rule_results = self.rules.run_all(response, context, params.hard_floor);
        let category_scores = category_scores(&rule_results);
        let overall_score = clamp_score(params.weights.weighted_average(&category_scores));

        let passing = self.store.passing_scores(&context.subagent_id).await;
        let threshold = adaptive_threshold(&passing, params, self.min_passing_samples);

        let mut assessment = QualityAssessment {
            overall_score,
            passed: false,
            category_scores,
            critical_issues: Vec::new(),
            refinement_suggestions: Vec::new(),
            rule_results,
            processing_time_ms: 0,
            threshold,
            hard_floor: params.hard_floor,
            parameters_version: params.version,
        };
        let min_category = assessment.min_category_score();
        assessment.passed = !assessment.category_scores.is_empty()
            && overall_score >= threshold
            && min_category >= params.hard_floor;
        assessment.critical_issues = critical_issues(&assessment);
        assessment.refinement_suggestions = refinement_suggestions(&assessment.rule_results, threshold);
        assessment.processing_time_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            subagent_id = %context.subagent_id,
            overall_score = assessment.overall_score,
            threshold = assessment.threshold,
            min_category_score = min_category,
            passed = assessment.passed,
            parameters_version = assessment.parameters_version,
            processing_time_ms = assessment.processing_time_ms,
            "Quality assessment complete"
        );

        self.store
            .record_quality(QualityMetric::from_assessment(&assessment, context))
            .await;
        self.store
            .record_performance(PerformanceMetric::success(
                ASSESS_OPERATION,
                assessment.processing_time_ms,
            ))
            .await;

        assessment
    }
}

fn critical_issues(assessment: &QualityAssessment) -> Vec<String> {
    let mut issues = Vec::new();
    if assessment.overall_score < assessment.threshold {
        issues.push(format!(
            "Overall score {} is below the threshold {}",
            to_display_points(assessment.overall_score),
            to_display_points(assessment.threshold)
        ));
    }
    for result in &assessment.rule_results {
        if result.score < assessment.hard_floor {
            issues.push(format!(
                "{} scored {} (floor {})",
                result.category,
                to_display_points(result.score),
                to_display_points(assessment.hard_floor)
            ));
            issues.extend(result.issues.iter().map(|i| format!("{}: {i}", result.category)));
        }
    }
    issues
}

/// Suggestions of every rule that fell short, without duplicates.
fn refinement_suggestions(results: &[QualityRuleResult], threshold: f64) -> Vec<String> {
    let mut seen = BTreeSet::new();
    results
        .iter()
        .filter(|r| !r.passed || r.score < threshold)
        .flat_map(|r| r.suggestions.iter())
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}
