//! Refinement loop around a sub-agent.
//!
//! `run_task` drives one delegated task through the refinement state machine:
//! draft, validate, and on rejection retry with feedback until the response
//! passes or the attempt budget is spent. An exhausted task still returns its
//! best-scoring attempt together with the categories that held it back.
//!
//! Admission is a non-blocking try-acquire on a counting semaphore. The permit
//! is owned by the running task and released on every exit path, including
//! cancellation and timeout of the sub-agent call.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::quality::to_display_points;
use crate::domain::models::{
    AttemptRecord, PerformanceMetric, PredictionRequest, QualityAssessment, RefinementConfig,
    RefinementMachine, RefinementState, SubagentRequest, SubagentResponse, TaskRunResult,
    TaskSpec, TaskStatus, UsageMetric,
};
use crate::domain::ports::SubagentInvoker;
use crate::services::analytics_store::AnalyticsStore;
use crate::services::prediction::PredictionEngine;
use crate::services::quality_validator::QualityValidator;

pub const INVOKE_OPERATION: &str = "subagent_invoke";
pub const RUN_TASK_OPERATION: &str = "run_task";

/// Rejections that happen before a task starts.
#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("At capacity: {in_flight} of {limit} task slots in use")]
    AtCapacity { limit: usize, in_flight: usize },

    #[error("Invalid task: {0}")]
    InvalidTask(String),
}

impl From<RefinementError> for DomainError {
    fn from(err: RefinementError) -> Self {
        match err {
            RefinementError::AtCapacity { limit, in_flight } => DomainError::AtCapacity { limit, in_flight },
            RefinementError::InvalidTask(msg) => DomainError::InvalidInput(msg),
        }
    }
}

pub struct RefinementController {
    validator: Arc<QualityValidator>,
    invoker: Arc<dyn SubagentInvoker>,
    store: Arc<AnalyticsStore>,
    prediction: Option<Arc<PredictionEngine>>,
    config: RefinementConfig,
    slots: Arc<Semaphore>,
}

impl RefinementController {
    pub fn new(
        validator: Arc<QualityValidator>,
        invoker: Arc<dyn SubagentInvoker>,
        store: Arc<AnalyticsStore>,
        config: RefinementConfig,
    ) -> Self {
        let limit = config.max_concurrent_tasks;
        Self {
            validator,
            invoker,
            store,
            prediction: None,
            config,
            slots: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Consult the prediction engine before spending refinement attempts.
    pub fn with_prediction(mut self, engine: Arc<PredictionEngine>) -> Self {
        self.prediction = Some(engine);
        self
    }

    pub fn capacity(&self) -> usize {
        self.config.max_concurrent_tasks
    }

    pub fn in_flight(&self) -> usize {
        self.capacity().saturating_sub(self.slots.available_permits())
    }

    /// Run a task to a terminal result.
    ///
    /// Fails only when the task is rejected up front; every admitted task
    /// ends in `Passed`, `Exhausted` or `Cancelled`.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn run_task(
        &self,
        spec: TaskSpec,
        cancel: CancellationToken,
    ) -> Result<TaskRunResult, RefinementError> {
        if spec.subagent_id.trim().is_empty() {
            return Err(RefinementError::InvalidTask("subagent id is empty".to_string()));
        }
        if spec.prompt.trim().is_empty() {
            return Err(RefinementError::InvalidTask("prompt is empty".to_string()));
        }

        let _permit = self.slots.clone().try_acquire_owned().map_err(|_| {
            let limit = self.capacity();
            tracing::warn!(task_id = %spec.id, limit, "Task rejected: at capacity");
            RefinementError::AtCapacity {
                limit,
                in_flight: self.in_flight(),
            }
        })?;

        tracing::info!(
            task_id = %spec.id,
            subagent_id = %spec.subagent_id,
            "Starting task"
        );
        let started = Instant::now();
        let result = self.drive(&spec, &cancel).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.record_run(&spec, &result, duration_ms).await;
        tracing::info!(
            task_id = %spec.id,
            subagent_id = %spec.subagent_id,
            status = %result.status,
            attempts = result.attempts,
            score = result.assessment.as_ref().map(|a| a.overall_score),
            duration_ms,
            "Task finished"
        );
        Ok(result)
    }

    async fn drive(&self, spec: &TaskSpec, cancel: &CancellationToken) -> TaskRunResult {
        let max_attempts = spec.max_attempts.unwrap_or(self.config.max_attempts);
        let mut machine = RefinementMachine::new(max_attempts);
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut previous_response: Option<String> = None;

        while let Ok(attempt) = machine.begin_attempt() {
            let request = SubagentRequest {
                task_id: spec.id,
                subagent_id: spec.subagent_id.clone(),
                prompt: spec.prompt.clone(),
                attempt,
                feedback: feedback.take(),
                previous_response: previous_response.take(),
            };
            let predicted = self.predicted_score(spec, attempt, last_assessment(&history)).await;

            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                outcome = self.invoke(request) => Some(outcome),
            };

            let Some(outcome) = outcome else {
                self.store
                    .record_performance(PerformanceMetric::failure(
                        INVOKE_OPERATION,
                        elapsed_ms(clock),
                        "cancelled",
                    ))
                    .await;
                advance(&mut machine, RefinementState::Cancelled);
                return finish(spec, &machine, history, TaskStatus::Cancelled, "Cancelled by caller".to_string());
            };

            match outcome {
                Ok(response) => {
                    advance(&mut machine, RefinementState::Validating);
                    let content = response.content();
                    let context = spec.validation_context(attempt);
                    let assessment = self.validator.assess(&content, &context).await;

                    if let (Some(engine), Some(predicted)) = (&self.prediction, predicted) {
                        engine
                            .record_outcome(&spec.subagent_id, predicted, assessment.overall_score)
                            .await;
                    }

                    let passed = assessment.passed;
                    if !passed {
                        feedback = Some(build_feedback(&assessment));
                        previous_response = Some(content.clone());
                    }
                    history.push(AttemptRecord {
                        attempt,
                        response: Some(content),
                        assessment: Some(assessment),
                        error: None,
                        started_at,
                        duration_ms: elapsed_ms(clock),
                    });

                    if passed {
                        advance(&mut machine, RefinementState::Passed);
                        return finish(
                            spec,
                            &machine,
                            history,
                            TaskStatus::Passed,
                            format!("Passed on attempt {attempt}"),
                        );
                    }
                    advance(&mut machine, RefinementState::NeedsRefinement);
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %spec.id,
                        attempt,
                        error = %e,
                        "Sub-agent call failed"
                    );
                    feedback = Some(format!(
                        "The previous attempt failed ({e}). Produce a complete response to the task."
                    ));
                    history.push(AttemptRecord {
                        attempt,
                        response: None,
                        assessment: None,
                        error: Some(e.to_string()),
                        started_at,
                        duration_ms: elapsed_ms(clock),
                    });
                    advance(&mut machine, RefinementState::NeedsRefinement);
                }
            }

            if !machine.has_attempts_left() {
                break;
            }
            if let Some(reason) = self.short_circuit_reason(spec, last_assessment(&history)).await {
                tracing::info!(task_id = %spec.id, attempts = machine.attempts(), %reason, "Refinement short-circuited");
                advance(&mut machine, RefinementState::Exhausted);
                return finish(spec, &machine, history, TaskStatus::Exhausted, reason);
            }
            advance(&mut machine, RefinementState::Refining);
            tracing::debug!(task_id = %spec.id, next_attempt = attempt + 1, "Refining response");
        }

        advance(&mut machine, RefinementState::Exhausted);
        let reason = match best_attempt(&history).and_then(AttemptRecord::score) {
            Some(best_score) => DomainError::ExhaustedRefinement {
                attempts: machine.attempts(),
                best_score,
            }
            .to_string(),
            None => format!(
                "All {} attempts failed: {}",
                machine.attempts(),
                history
                    .last()
                    .and_then(|a| a.error.clone())
                    .unwrap_or_else(|| "no response".to_string())
            ),
        };
        tracing::warn!(task_id = %spec.id, %reason, "Refinement exhausted");
        finish(spec, &machine, history, TaskStatus::Exhausted, reason)
    }

    /// One sub-agent call under the per-call timeout.
    async fn invoke(&self, request: SubagentRequest) -> DomainResult<SubagentResponse> {
        let timeout_ms = self.config.invoke_timeout_ms;
        let clock = Instant::now();
        let result = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.invoker.invoke(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout(timeout_ms)),
        };

        let metric = match result {
            Ok(_) => PerformanceMetric::success(INVOKE_OPERATION, elapsed_ms(clock)),
            Err(ref e) => PerformanceMetric::failure(INVOKE_OPERATION, elapsed_ms(clock), e.kind()),
        };
        self.store.record_performance(metric).await;
        result
    }

    /// Ensemble forecast for the coming attempt, when a real model answered.
    async fn predicted_score(
        &self,
        spec: &TaskSpec,
        attempt: u32,
        last: Option<&QualityAssessment>,
    ) -> Option<f64> {
        let engine = self.prediction.as_ref()?;
        let request = PredictionRequest {
            subagent_id: spec.subagent_id.clone(),
            category_scores: last.map(|a| a.category_scores.clone()).unwrap_or_default(),
            current_score: last.map(|a| a.overall_score),
            attempt,
        };
        let prediction = engine.predict(&request).await;
        (!prediction.fallback).then_some(prediction.final_prediction)
    }

    async fn short_circuit_reason(
        &self,
        spec: &TaskSpec,
        last: Option<&QualityAssessment>,
    ) -> Option<String> {
        if !self.config.prediction_short_circuit {
            return None;
        }
        let engine = self.prediction.as_ref()?;
        let assessment = last?;

        match engine
            .refinement_success_probability(&spec.subagent_id, assessment.overall_score, assessment.threshold)
            .await
        {
            Ok(p) if p < self.config.min_success_probability => Some(format!(
                "Predicted refinement success probability {p:.2} is below {:.2}",
                self.config.min_success_probability
            )),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(subagent_id = %spec.subagent_id, error = %e, "No refinement prediction");
                None
            }
        }
    }

    async fn record_run(&self, spec: &TaskSpec, result: &TaskRunResult, duration_ms: u64) {
        let success = result.status == TaskStatus::Passed;
        self.store
            .record_usage(UsageMetric {
                timestamp: Utc::now(),
                subagent_id: spec.subagent_id.clone(),
                session_id: spec.session_id.clone().unwrap_or_else(|| spec.id.to_string()),
                operation: RUN_TASK_OPERATION.to_string(),
                success,
                task_complexity: spec.complexity,
            })
            .await;
        let metric = if success {
            PerformanceMetric::success(RUN_TASK_OPERATION, duration_ms)
        } else {
            PerformanceMetric::failure(RUN_TASK_OPERATION, duration_ms, result.status.to_string())
        };
        self.store.record_performance(metric).await;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(clock: Instant) -> u64 {
    clock.elapsed().as_millis() as u64
}

/// Apply a transition the loop has already established as legal.
fn advance(machine: &mut RefinementMachine, next: RefinementState) {
    if let Err(e) = machine.transition(next) {
        tracing::error!(error = %e, "Refinement state machine rejected transition");
    }
}

fn last_assessment(history: &[AttemptRecord]) -> Option<&QualityAssessment> {
    history.last().and_then(|a| a.assessment.as_ref())
}

fn best_attempt(history: &[AttemptRecord]) -> Option<&AttemptRecord> {
    history
        .iter()
        .filter(|a| a.assessment.is_some())
        .max_by(|a, b| {
            a.score()
                .unwrap_or(0.0)
                .total_cmp(&b.score().unwrap_or(0.0))
                // Prefer the earlier attempt on ties.
                .then(b.attempt.cmp(&a.attempt))
        })
}

/// Feedback sent with the next attempt.
pub fn build_feedback(assessment: &QualityAssessment) -> String {
    let mut lines = vec![format!(
        "Your previous response scored {} and needs at least {} to be accepted.",
        to_display_points(assessment.overall_score),
        to_display_points(assessment.threshold)
    )];
    if !assessment.critical_issues.is_empty() {
        lines.push("Critical issues:".to_string());
        lines.extend(assessment.critical_issues.iter().map(|i| format!("- {i}")));
    }
    if !assessment.refinement_suggestions.is_empty() {
        lines.push("Suggestions:".to_string());
        lines.extend(assessment.refinement_suggestions.iter().map(|s| format!("- {s}")));
    }
    lines.join("\n")
}

fn finish(
    spec: &TaskSpec,
    machine: &RefinementMachine,
    history: Vec<AttemptRecord>,
    status: TaskStatus,
    reason: String,
) -> TaskRunResult {
    let chosen = match status {
        TaskStatus::Passed => history.last(),
        TaskStatus::Exhausted | TaskStatus::Cancelled => best_attempt(&history),
    };
    let assessment = chosen.and_then(|a| a.assessment.clone());
    let diagnostic_categories = match status {
        TaskStatus::Passed => Vec::new(),
        _ => assessment.as_ref().map(QualityAssessment::weak_categories).unwrap_or_default(),
    };

    TaskRunResult {
        task_id: spec.id,
        subagent_id: spec.subagent_id.clone(),
        result: chosen.and_then(|a| a.response.clone()),
        assessment,
        attempts: machine.attempts(),
        status,
        diagnostic_categories,
        reason,
        history,
    }
}
