//! Quality assessment domain types.
//!
//! A [`QualityAssessment`] is the output of one pass of the quality gate over
//! a single sub-agent response. It is built once per attempt and never
//! mutated afterwards; refinement produces a fresh assessment per attempt.
//!
//! All scores are normalized to `[0, 1]`. The 0-100 scale only appears at the
//! display boundary (see [`to_display_points`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Convert an internal `[0, 1]` score to the 0-100 display scale.
pub fn to_display_points(score: f64) -> f64 {
    (score * 100.0 * 10.0).round() / 10.0
}

/// Clamp a score into `[0, 1]`, mapping non-finite values to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// QualityCategory
// ---------------------------------------------------------------------------

/// Category scored by one rule checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCategory {
    Format,
    Completeness,
    Specificity,
    StructuredOperationsValidity,
    TaskCompletion,
}

impl QualityCategory {
    /// Every category, in registry order.
    pub const ALL: [QualityCategory; 5] = [
        QualityCategory::Format,
        QualityCategory::Completeness,
        QualityCategory::Specificity,
        QualityCategory::StructuredOperationsValidity,
        QualityCategory::TaskCompletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Completeness => "completeness",
            Self::Specificity => "specificity",
            Self::StructuredOperationsValidity => "structured_operations_validity",
            Self::TaskCompletion => "task_completion",
        }
    }

    /// Parse from the snake_case name used in config and parameter keys.
    pub fn from_str_opt(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ValidationContext
// ---------------------------------------------------------------------------

/// Immutable context accompanying one validation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationContext {
    pub subagent_id: String,
    pub requirements_text: String,
    pub quality_criteria_text: String,
    pub task_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Number of refinement attempts already spent before this response.
    #[serde(default)]
    pub refinement_attempts: u32,
    /// Experiment whose variant parameters judged this response.
    #[serde(default)]
    pub experiment_id: Option<String>,
}

impl ValidationContext {
    pub fn new(subagent_id: impl Into<String>, requirements_text: impl Into<String>) -> Self {
        Self {
            subagent_id: subagent_id.into(),
            requirements_text: requirements_text.into(),
            quality_criteria_text: String::new(),
            task_type: "general".to_string(),
            timestamp: Utc::now(),
            session_id: None,
            refinement_attempts: 0,
            experiment_id: None,
        }
    }

    pub fn with_quality_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.quality_criteria_text = criteria.into();
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_refinement_attempts(mut self, attempts: u32) -> Self {
        self.refinement_attempts = attempts;
        self
    }

    pub fn with_experiment(mut self, experiment_id: impl Into<String>) -> Self {
        self.experiment_id = Some(experiment_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// QualityRuleResult
// ---------------------------------------------------------------------------

/// Output of a single rule checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRuleResult {
    /// Name of the rule that produced this result.
    pub rule: String,
    pub category: QualityCategory,
    pub score: f64,
    pub passed: bool,
    pub issues: Vec<String>,
    /// Concrete advice for the next refinement attempt.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl QualityRuleResult {
    /// Build a result, clamping the score and deriving `passed` from the
    /// given floor.
    pub fn new(
        rule: impl Into<String>,
        category: QualityCategory,
        score: f64,
        floor: f64,
    ) -> Self {
        let score = clamp_score(score);
        Self {
            rule: rule.into(),
            category,
            score,
            passed: score >= floor,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Result for a rule checker that failed to run.
    pub fn failed_checker(rule: impl Into<String>, category: QualityCategory, reason: &str) -> Self {
        let rule = rule.into();
        Self {
            issues: vec![format!("Rule checker '{rule}' failed: {reason}")],
            suggestions: Vec::new(),
            rule,
            category,
            score: 0.0,
            passed: false,
        }
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

// ---------------------------------------------------------------------------
// QualityAssessment
// ---------------------------------------------------------------------------

/// Structured verdict of the quality gate for one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub overall_score: f64,
    pub passed: bool,
    pub category_scores: BTreeMap<QualityCategory, f64>,
    pub rule_results: Vec<QualityRuleResult>,
    pub critical_issues: Vec<String>,
    pub refinement_suggestions: Vec<String>,
    pub processing_time_ms: u64,
    /// Pass threshold that was applied (adaptive, per subagent).
    pub threshold: f64,
    /// Minimum score every category had to reach.
    pub hard_floor: f64,
    /// Version of the published parameter set used for this assessment.
    pub parameters_version: u64,
}

impl QualityAssessment {
    /// Lowest category score, or 0 when no category was scored.
    pub fn min_category_score(&self) -> f64 {
        self.category_scores
            .values()
            .copied()
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
            .unwrap_or(0.0)
    }

    /// Categories whose score fell below the hard floor.
    pub fn failing_categories(&self) -> Vec<QualityCategory> {
        self.category_scores
            .iter()
            .filter(|(_, score)| **score < self.hard_floor)
            .map(|(category, _)| *category)
            .collect()
    }

    /// Categories below the hard floor or below the overall threshold,
    /// weakest first. Used as diagnostics for exhausted refinement.
    pub fn weak_categories(&self) -> Vec<QualityCategory> {
        let mut weak: Vec<(QualityCategory, f64)> = self
            .category_scores
            .iter()
            .filter(|(_, score)| **score < self.threshold)
            .map(|(c, s)| (*c, *s))
            .collect();
        weak.sort_by(|a, b| a.1.total_cmp(&b.1));
        weak.into_iter().map(|(c, _)| c).collect()
    }
}
