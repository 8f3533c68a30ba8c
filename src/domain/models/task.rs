//! Delegated task and refinement state machine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::metrics::TaskComplexity;
use super::quality::{QualityAssessment, QualityCategory, ValidationContext};
use crate::domain::errors::{DomainError, DomainResult};

// ---------------------------------------------------------------------------
// TaskSpec
// ---------------------------------------------------------------------------

/// A unit of work delegated to a subagent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: Uuid,
    pub subagent_id: String,
    pub prompt: String,
    pub requirements: String,
    #[serde(default)]
    pub quality_criteria: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub complexity: Option<TaskComplexity>,
    /// Overrides the configured maximum attempts for this task.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_task_type() -> String {
    "general".to_string()
}

impl TaskSpec {
    pub fn new(
        subagent_id: impl Into<String>,
        prompt: impl Into<String>,
        requirements: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subagent_id: subagent_id.into(),
            prompt: prompt.into(),
            requirements: requirements.into(),
            quality_criteria: String::new(),
            task_type: default_task_type(),
            session_id: None,
            complexity: None,
            max_attempts: None,
        }
    }

    pub fn with_quality_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.quality_criteria = criteria.into();
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

    pub fn with_complexity(mut self, complexity: TaskComplexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Validation context for the given attempt (1-based).
    pub fn validation_context(&self, attempt: u32) -> ValidationContext {
        let mut context = ValidationContext::new(self.subagent_id.clone(), self.requirements.clone())
            .with_quality_criteria(self.quality_criteria.clone())
            .with_task_type(self.task_type.clone())
            .with_refinement_attempts(attempt.saturating_sub(1));
        if let Some(ref session) = self.session_id {
            context = context.with_session(session.clone());
        }
        context
    }
}

// ---------------------------------------------------------------------------
// Sub-agent request/response
// ---------------------------------------------------------------------------

/// What the external sub-agent capability is asked to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentRequest {
    pub task_id: Uuid,
    pub subagent_id: String,
    pub prompt: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Feedback from the previous rejected attempt.
    pub feedback: Option<String>,
    pub previous_response: Option<String>,
}

/// Raw output of the external sub-agent capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentResponse {
    pub text: String,
    #[serde(default)]
    pub structured: Option<serde_json::Value>,
}

impl SubagentResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    /// The content that is validated: the text, or the pretty-printed
    /// structured result when no text was returned.
    pub fn content(&self) -> String {
        if self.text.trim().is_empty() {
            if let Some(ref value) = self.structured {
                return serde_json::to_string_pretty(value).unwrap_or_default();
            }
        }
        self.text.clone()
    }
}

// ---------------------------------------------------------------------------
// RefinementState
// ---------------------------------------------------------------------------

/// States of the refinement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementState {
    Drafting,
    Validating,
    NeedsRefinement,
    Refining,
    Passed,
    Exhausted,
    Cancelled,
}

impl RefinementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::Validating => "validating",
            Self::NeedsRefinement => "needs_refinement",
            Self::Refining => "refining",
            Self::Passed => "passed",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Exhausted | Self::Cancelled)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> Vec<RefinementState> {
        match self {
            // A failed draft call goes straight to needs-refinement.
            Self::Drafting => vec![Self::Validating, Self::NeedsRefinement, Self::Exhausted, Self::Cancelled],
            Self::Validating => vec![Self::Passed, Self::NeedsRefinement, Self::Cancelled],
            Self::NeedsRefinement => vec![Self::Refining, Self::Exhausted, Self::Cancelled],
            Self::Refining => vec![Self::Validating, Self::NeedsRefinement, Self::Exhausted, Self::Cancelled],
            Self::Passed | Self::Exhausted | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for RefinementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus the per-task attempt counter.
///
/// The counter only ever increases; a new task gets a new machine.
#[derive(Debug, Clone)]
pub struct RefinementMachine {
    state: RefinementState,
    attempts: u32,
    max_attempts: u32,
    history: Vec<RefinementState>,
}

impl RefinementMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: RefinementState::Drafting,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            history: vec![RefinementState::Drafting],
        }
    }

    pub fn state(&self) -> RefinementState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn history(&self) -> &[RefinementState] {
        &self.history
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Count one spent attempt. Fails once the budget is used up.
    pub fn begin_attempt(&mut self) -> DomainResult<u32> {
        if !self.has_attempts_left() {
            return Err(DomainError::ExhaustedRefinement {
                attempts: self.attempts,
                best_score: 0.0,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    pub fn transition(&mut self, next: RefinementState) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task results
// ---------------------------------------------------------------------------

/// Terminal status of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Passed,
    Exhausted,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Record of one attempt within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub response: Option<String>,
    pub assessment: Option<QualityAssessment>,
    /// Invocation error, when the sub-agent call itself failed.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AttemptRecord {
    pub fn score(&self) -> Option<f64> {
        self.assessment.as_ref().map(|a| a.overall_score)
    }
}

/// Final outcome of `run_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunResult {
    pub task_id: Uuid,
    pub subagent_id: String,
    /// Accepted response, or the best-scoring response when exhausted.
    pub result: Option<String>,
    pub assessment: Option<QualityAssessment>,
    pub attempts: u32,
    pub status: TaskStatus,
    /// Categories that kept the best attempt from passing.
    pub diagnostic_categories: Vec<QualityCategory>,
    /// Why the run ended the way it did.
    pub reason: String,
    pub history: Vec<AttemptRecord>,
}
