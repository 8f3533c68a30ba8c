//! Completeness rule: does the response cover what was asked for.

use anyhow::Result;

use super::text::{significant_terms, term_coverage};
use super::traits::{QualityRule, RuleOutcome};
use crate::domain::models::{QualityCategory, ValidationContext};

const COVERAGE_WEIGHT: f64 = 0.8;
const LENGTH_WEIGHT: f64 = 0.2;
/// Response length, relative to the requirements, that counts as substantial.
const EXPECTED_LENGTH_RATIO: f64 = 0.5;
const MAX_LISTED_TERMS: usize = 5;

pub struct CompletenessRule;

impl QualityRule for CompletenessRule {
    fn name(&self) -> &str {
        "completeness"
    }

    fn category(&self) -> QualityCategory {
        QualityCategory::Completeness
    }

    #[allow(clippy::cast_precision_loss)]
    fn check(&self, response: &str, context: &ValidationContext) -> Result<RuleOutcome> {
        let terms = significant_terms(&context.requirements_text);
        let (coverage, missing) = term_coverage(&terms, response);

        let required_chars = context.requirements_text.trim().chars().count() as f64;
        let response_chars = response.trim().chars().count() as f64;
        let length_factor = if required_chars == 0.0 {
            1.0
        } else {
            (response_chars / (required_chars * EXPECTED_LENGTH_RATIO)).min(1.0)
        };

        let mut outcome = RuleOutcome {
            score: COVERAGE_WEIGHT * coverage + LENGTH_WEIGHT * length_factor,
            ..RuleOutcome::default()
        };

        if !missing.is_empty() {
            let listed: Vec<&str> = missing.iter().take(MAX_LISTED_TERMS).map(String::as_str).collect();
            outcome.issues.push(format!(
                "Requirements not addressed ({} of {} terms missing): {}",
                missing.len(),
                terms.len(),
                listed.join(", ")
            ));
            outcome
                .suggestions
                .push(format!("Address the missing requirements: {}", listed.join(", ")));
        }
        if length_factor < 1.0 {
            outcome.issues.push("Response is short relative to the requirements".to_string());
            outcome
                .suggestions
                .push("Cover each requirement in enough detail".to_string());
        }

        Ok(outcome)
    }
}
