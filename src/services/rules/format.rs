//! Format rule: presentation hygiene of the response.

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

use super::text::{cached_regex, fence_count};
use super::traits::{QualityRule, RuleOutcome};
use crate::domain::models::{QualityCategory, ValidationContext};

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();
const PLACEHOLDER_PATTERN: &str =
    r"(?i)\[(?:todo|tbd|insert|placeholder|your)[^\]]*\]|<(?:placeholder|insert)[^>]*>|\{\{[^}]*\}\}|lorem ipsum";

/// Responses longer than this are expected to carry some structure.
const STRUCTURE_EXPECTED_CHARS: usize = 400;

pub struct FormatRule {
    min_chars: usize,
}

impl FormatRule {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    fn has_structure(response: &str) -> bool {
        response.contains("\n\n")
            || response.lines().any(|line| {
                let line = line.trim_start();
                line.starts_with('#')
                    || line.starts_with("- ")
                    || line.starts_with("* ")
                    || line.starts_with("```")
                    || line.split_once(". ").is_some_and(|(n, _)| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
            })
    }
}

impl QualityRule for FormatRule {
    fn name(&self) -> &str {
        "format"
    }

    fn category(&self) -> QualityCategory {
        QualityCategory::Format
    }

    fn check(&self, response: &str, _context: &ValidationContext) -> Result<RuleOutcome> {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Ok(RuleOutcome {
                score: 0.0,
                issues: vec!["Response is empty".to_string()],
                suggestions: vec!["Provide a complete response to the task".to_string()],
            });
        }

        let mut outcome = RuleOutcome::perfect();
        let chars = trimmed.chars().count();

        if chars < self.min_chars {
            outcome.penalize(
                0.3,
                format!("Response is too short ({chars} characters, minimum {})", self.min_chars),
                "Expand the response with the details the task asks for",
            );
        }

        if fence_count(trimmed) % 2 != 0 {
            outcome.penalize(
                0.3,
                "Unbalanced code fence",
                "Close every ``` code block",
            );
        }

        if chars > STRUCTURE_EXPECTED_CHARS && !Self::has_structure(trimmed) {
            outcome.penalize(
                0.15,
                "Long response without headings, lists or paragraphs",
                "Organize the response into sections, lists or paragraphs",
            );
        }

        let placeholders = cached_regex(&PLACEHOLDER_RE, PLACEHOLDER_PATTERN)?;
        if let Some(found) = placeholders.find(trimmed) {
            outcome.penalize(
                0.25,
                format!("Unfilled placeholder: {}", found.as_str()),
                "Replace every placeholder with real content",
            );
        }

        Ok(outcome)
    }
}
