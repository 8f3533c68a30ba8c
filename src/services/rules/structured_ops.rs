//! Structured-operations rule: embedded JSON must parse.

use anyhow::Result;

use super::text::{json_blocks, preview};
use super::traits::{QualityRule, RuleOutcome};
use crate::domain::models::{QualityCategory, ValidationContext};

pub struct StructuredOperationsRule;

impl StructuredOperationsRule {
    /// Every JSON candidate in the response: fenced `json` blocks, or the
    /// whole response when it is a bare object or array.
    fn candidates(response: &str) -> Vec<String> {
        let mut candidates = json_blocks(response);
        let trimmed = response.trim();
        if candidates.is_empty() && (trimmed.starts_with('{') || trimmed.starts_with('[')) {
            candidates.push(trimmed.to_string());
        }
        candidates
    }
}

impl QualityRule for StructuredOperationsRule {
    fn name(&self) -> &str {
        "structured_operations"
    }

    fn category(&self) -> QualityCategory {
        QualityCategory::StructuredOperationsValidity
    }

    #[allow(clippy::cast_precision_loss)]
    fn check(&self, response: &str, _context: &ValidationContext) -> Result<RuleOutcome> {
        let candidates = Self::candidates(response);
        if candidates.is_empty() {
            return Ok(RuleOutcome::perfect());
        }

        let mut outcome = RuleOutcome::default();
        let mut valid = 0usize;
        for (index, candidate) in candidates.iter().enumerate() {
            match serde_json::from_str::<serde_json::Value>(candidate) {
                Ok(_) => valid += 1,
                Err(e) => {
                    outcome.issues.push(format!(
                        "Structured block {} is not valid JSON ({e}): {}",
                        index + 1,
                        preview(candidate.trim(), 60)
                    ));
                    outcome
                        .suggestions
                        .push(format!("Fix the JSON syntax of structured block {}", index + 1));
                }
            }
        }
        outcome.score = valid as f64 / candidates.len() as f64;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(response: &str) -> RuleOutcome {
        StructuredOperationsRule
            .check(response, &ValidationContext::new("tester", ""))
            .unwrap()
    }

    #[test]
    fn test_no_structured_content_scores_one() {
        assert!((check("Plain prose answer.").score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_half_valid_blocks() {
        let response = "```json\n{\"op\": \"create\"}\n```\n\n```json\n{\"op\": \n```\n";
        let outcome = check(response);
        assert!((outcome.score - 0.5).abs() < 1e-9);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].starts_with("Structured block 2"));
    }

    #[test]
    fn test_bare_json_response() {
        assert!((check("{\"status\": \"ok\"}").score - 1.0).abs() < f64::EPSILON);
        assert_eq!(check("{\"status\": ").score, 0.0);
    }
}
