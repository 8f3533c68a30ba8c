//! Rule checker trait and its output.

use anyhow::Result;

use crate::domain::models::{QualityCategory, QualityRuleResult, ValidationContext};

/// Raw verdict of one checker before the hard floor is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl RuleOutcome {
    pub fn perfect() -> Self {
        Self {
            score: 1.0,
            ..Self::default()
        }
    }

    /// Subtract `penalty` from the score and note the issue and its fix.
    pub fn penalize(&mut self, penalty: f64, issue: impl Into<String>, suggestion: impl Into<String>) {
        self.score -= penalty;
        self.issues.push(issue.into());
        self.suggestions.push(suggestion.into());
    }

    pub fn into_result(self, rule: &str, category: QualityCategory, floor: f64) -> QualityRuleResult {
        QualityRuleResult::new(rule, category, self.score, floor)
            .with_issues(self.issues)
            .with_suggestions(self.suggestions)
    }
}

/// A deterministic, explainable check of one quality category.
///
/// Checkers are independent: each sees only the response and its context,
/// never another checker's result.
pub trait QualityRule: Send + Sync {
    /// Unique rule name, used as the registry key.
    fn name(&self) -> &str;

    fn category(&self) -> QualityCategory;

    /// Score the response. Errors are contained by the registry and score the
    /// category 0.
    fn check(&self, response: &str, context: &ValidationContext) -> Result<RuleOutcome>;
}
