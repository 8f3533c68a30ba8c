//! Text helpers shared by the rule checkers.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "because", "been", "before", "being", "below",
    "between", "both", "could", "does", "doing", "each", "from", "further", "have", "having",
    "here", "into", "itself", "just", "more", "most", "must", "only", "other", "over", "same",
    "should", "some", "such", "than", "that", "their", "them", "then", "there", "these", "they",
    "this", "those", "through", "under", "until", "very", "were", "what", "when", "where",
    "which", "while", "will", "with", "would", "your", "please", "make", "sure", "need",
];

/// Compile `pattern` once into `cell`.
pub fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex> {
    if let Some(regex) = cell.get() {
        return Ok(regex);
    }
    let regex = Regex::new(pattern).with_context(|| format!("Invalid regex pattern: {pattern}"))?;
    Ok(cell.get_or_init(|| regex))
}

/// Lowercased words of at least four characters that are not stopwords.
pub fn significant_terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| w.chars().count() >= 4 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Share of `terms` that occur in `response` (1.0 when there are no terms).
pub fn term_coverage(terms: &BTreeSet<String>, response: &str) -> (f64, Vec<String>) {
    if terms.is_empty() {
        return (1.0, Vec::new());
    }
    let haystack = response.to_lowercase();
    let missing: Vec<String> = terms
        .iter()
        .filter(|t| !haystack.contains(t.as_str()))
        .cloned()
        .collect();
    #[allow(clippy::cast_precision_loss)]
    let coverage = 1.0 - missing.len() as f64 / terms.len() as f64;
    (coverage, missing)
}

/// Number of ``` fence markers at line starts.
pub fn fence_count(text: &str) -> usize {
    text.lines().filter(|l| l.trim_start().starts_with("```")).count()
}

/// Bodies of fenced blocks whose info string is `json`.
pub fn json_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(info) = trimmed.strip_prefix("```") {
            if in_fence {
                if let Some(body) = current.take() {
                    blocks.push(body);
                }
                in_fence = false;
            } else {
                in_fence = true;
                if info.trim().eq_ignore_ascii_case("json") {
                    current = Some(String::new());
                }
            }
            continue;
        }
        if let Some(ref mut body) = current {
            body.push_str(line);
            body.push('\n');
        }
    }
    // An unterminated json fence is still checked.
    if let Some(body) = current {
        blocks.push(body);
    }
    blocks
}

/// Truncate to `max` characters for issue messages.
pub fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str("...");
    }
    out
}
