//! Specificity rule: concrete detail versus vague filler.

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

use super::text::cached_regex;
use super::traits::{QualityRule, RuleOutcome};
use crate::domain::models::{QualityCategory, ValidationContext};

static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static PATH_RE: OnceLock<Regex> = OnceLock::new();
static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();
static CODE_RE: OnceLock<Regex> = OnceLock::new();
static VAGUE_RE: OnceLock<Regex> = OnceLock::new();

const NUMBER_PATTERN: &str = r"\b\d+(?:\.\d+)?%?";
const PATH_PATTERN: &str =
    r"(?:[\w.-]+/)+[\w.-]+|\b[\w-]+\.(?:rs|py|ts|js|json|yaml|yml|toml|md|sql|go|java|sh)\b";
const IDENTIFIER_PATTERN: &str = r"\b[a-z]+(?:_[a-z0-9]+)+\b|\b[a-z]+[A-Z]\w*\b|\b\w+\(\)";
const CODE_PATTERN: &str = r"`[^`\n]+`|(?m)^```";
const VAGUE_PATTERN: &str = r"(?i)\b(?:various|etc|some things|stuff|and so on|it depends|in general|generally speaking|somehow|a number of|many things|as needed|as appropriate)\b";

/// Concrete signals needed for full marks.
const SATURATION: f64 = 4.0;
const BASE_SCORE: f64 = 0.5;
const VAGUE_PENALTY: f64 = 0.1;
const MAX_VAGUE_PENALTY: f64 = 0.4;

pub struct SpecificityRule;

impl QualityRule for SpecificityRule {
    fn name(&self) -> &str {
        "specificity"
    }

    fn category(&self) -> QualityCategory {
        QualityCategory::Specificity
    }

    #[allow(clippy::cast_precision_loss)]
    fn check(&self, response: &str, _context: &ValidationContext) -> Result<RuleOutcome> {
        let signals = cached_regex(&NUMBER_RE, NUMBER_PATTERN)?.find_iter(response).count()
            + cached_regex(&PATH_RE, PATH_PATTERN)?.find_iter(response).count()
            + cached_regex(&IDENTIFIER_RE, IDENTIFIER_PATTERN)?.find_iter(response).count()
            + cached_regex(&CODE_RE, CODE_PATTERN)?.find_iter(response).count();

        let vague: Vec<String> = cached_regex(&VAGUE_RE, VAGUE_PATTERN)?
            .find_iter(response)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let concrete = (signals as f64 / SATURATION).min(1.0);
        let penalty = (vague.len() as f64 * VAGUE_PENALTY).min(MAX_VAGUE_PENALTY);

        let mut outcome = RuleOutcome {
            score: BASE_SCORE + (1.0 - BASE_SCORE) * concrete - penalty,
            ..RuleOutcome::default()
        };

        if signals == 0 {
            outcome.issues.push("No concrete details (numbers, paths, identifiers or code)".to_string());
            outcome
                .suggestions
                .push("Reference specific files, values, identifiers or code".to_string());
        }
        if !vague.is_empty() {
            outcome
                .issues
                .push(format!("Vague phrasing: {}", vague.join(", ")));
            outcome
                .suggestions
                .push("Replace vague phrases with the concrete items they stand for".to_string());
        }

        Ok(outcome)
    }
}
