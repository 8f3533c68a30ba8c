//! Rule checkers of the quality gate.
//!
//! Each checker scores one [`QualityCategory`] and is registered by name in a
//! [`RuleRegistry`]. The registry isolates checkers from each other: an error
//! or panic inside one checker scores its category 0 with an explanatory
//! issue and never aborts the assessment.
//!
//! | Rule                    | Category                       |
//! |-------------------------|--------------------------------|
//! | `format`                | format                         |
//! | `completeness`          | completeness                   |
//! | `specificity`           | specificity                    |
//! | `structured_operations` | structured operations validity |
//! | `task_completion`       | task completion                |

pub mod completeness;
pub mod format;
pub mod specificity;
pub mod structured_ops;
pub mod task_completion;
pub mod text;
pub mod traits;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::models::{QualityCategory, QualityRuleResult, ValidationContext};

pub use completeness::CompletenessRule;
pub use format::FormatRule;
pub use specificity::SpecificityRule;
pub use structured_ops::StructuredOperationsRule;
pub use task_completion::TaskCompletionRule;
pub use traits::{QualityRule, RuleOutcome};

// ---------------------------------------------------------------------------
// RuleRegistry
// ---------------------------------------------------------------------------

/// Named lookup table of rule checkers.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn QualityRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the five built-in checkers.
    pub fn with_defaults(min_response_chars: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FormatRule::new(min_response_chars)));
        registry.register(Arc::new(CompletenessRule));
        registry.register(Arc::new(SpecificityRule));
        registry.register(Arc::new(StructuredOperationsRule));
        registry.register(Arc::new(TaskCompletionRule));
        registry
    }

    /// Register a checker, replacing any checker with the same name.
    pub fn register(&mut self, rule: Arc<dyn QualityRule>) {
        self.rules.insert(rule.name().to_string(), rule);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn QualityRule>> {
        self.rules.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every checker against the response.
    pub fn run_all(&self, response: &str, context: &ValidationContext, floor: f64) -> Vec<QualityRuleResult> {
        self.rules
            .iter()
            .map(|(name, rule)| run_contained(name, rule.as_ref(), response, context, floor))
            .collect()
    }
}

fn run_contained(
    name: &str,
    rule: &dyn QualityRule,
    response: &str,
    context: &ValidationContext,
    floor: f64,
) -> QualityRuleResult {
    let category = rule.category();
    match panic::catch_unwind(AssertUnwindSafe(|| rule.check(response, context))) {
        Ok(Ok(outcome)) => outcome.into_result(name, category, floor),
        Ok(Err(e)) => {
            tracing::warn!(rule = name, error = %e, "Rule checker failed");
            QualityRuleResult::failed_checker(name, category, &format!("{e:#}"))
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            tracing::warn!(rule = name, reason = %reason, "Rule checker panicked");
            QualityRuleResult::failed_checker(name, category, &reason)
        }
    }
}

/// Mean score per category over the given results.
pub fn category_scores(results: &[QualityRuleResult]) -> BTreeMap<QualityCategory, f64> {
    let mut sums: BTreeMap<QualityCategory, (f64, u32)> = BTreeMap::new();
    for result in results {
        let entry = sums.entry(result.category).or_insert((0.0, 0));
        entry.0 += result.score;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(category, (sum, n))| (category, sum / f64::from(n)))
        .collect()
}
