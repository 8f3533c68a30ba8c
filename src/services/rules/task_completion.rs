//! Task-completion rule: the work was finished, not deferred or refused.

use anyhow::Result;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::text::{cached_regex, significant_terms, term_coverage};
use super::traits::{QualityRule, RuleOutcome};
use crate::domain::models::{QualityCategory, ValidationContext};

static INCOMPLETE_RE: OnceLock<Regex> = OnceLock::new();
static CONCLUSION_RE: OnceLock<Regex> = OnceLock::new();

const INCOMPLETE_PATTERN: &str = r"(?i)\b(?:todo|fixme|tbd|unable to|cannot complete|can't complete|could not complete|not implemented|i'm sorry|as an ai|left as an exercise)\b";
const CONCLUSION_PATTERN: &str = r"(?i)\b(?:summary|conclusion|in short|overall|to summarize|recommendations?|next steps|result|completed|done)\b";

const MARKER_PENALTY: f64 = 0.3;
const MAX_MARKER_PENALTY: f64 = 0.6;
const CONCLUSION_PENALTY: f64 = 0.15;
/// Responses shorter than this are not expected to carry a conclusion.
const CONCLUSION_EXPECTED_CHARS: usize = 300;

pub struct TaskCompletionRule;

impl QualityRule for TaskCompletionRule {
    fn name(&self) -> &str {
        "task_completion"
    }

    fn category(&self) -> QualityCategory {
        QualityCategory::TaskCompletion
    }

    #[allow(clippy::cast_precision_loss)]
    fn check(&self, response: &str, context: &ValidationContext) -> Result<RuleOutcome> {
        let mut outcome = RuleOutcome::perfect();

        let markers: BTreeSet<String> = cached_regex(&INCOMPLETE_RE, INCOMPLETE_PATTERN)?
            .find_iter(response)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if !markers.is_empty() {
            let listed: Vec<&str> = markers.iter().map(String::as_str).collect();
            outcome.score -= (markers.len() as f64 * MARKER_PENALTY).min(MAX_MARKER_PENALTY);
            outcome
                .issues
                .push(format!("Incomplete or refused work: {}", listed.join(", ")));
            outcome
                .suggestions
                .push("Finish every part of the task instead of deferring it".to_string());
        }

        if response.trim().chars().count() >= CONCLUSION_EXPECTED_CHARS
            && !cached_regex(&CONCLUSION_RE, CONCLUSION_PATTERN)?.is_match(response)
        {
            outcome.penalize(
                CONCLUSION_PENALTY,
                "No conclusion or summary",
                "End with a short summary of the outcome",
            );
        }

        let criteria = significant_terms(&context.quality_criteria_text);
        if !criteria.is_empty() {
            let (coverage, missing) = term_coverage(&criteria, response);
            outcome.score *= 0.6 + 0.4 * coverage;
            if !missing.is_empty() {
                let listed: Vec<&str> = missing.iter().take(5).map(String::as_str).collect();
                outcome
                    .issues
                    .push(format!("Quality criteria not evidenced: {}", listed.join(", ")));
                outcome
                    .suggestions
                    .push(format!("Show how the response meets: {}", listed.join(", ")));
            }
        }

        Ok(outcome)
    }
}
