//! Black-box hill-climbing search over quality parameters.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::objective::Objective;
use super::safety::{SafetyPredicate, HARD_FLOOR_MAX, HARD_FLOOR_MIN};
use crate::domain::errors::DomainResult;
use crate::domain::models::parameters::{weight_param, PARAM_DEFAULT_THRESHOLD, PARAM_HARD_FLOOR};
use crate::domain::models::{
    ConvergencePoint, OptimizationConfig, OptimizationResult, ParameterSet, ParameterSpec,
    QualityCategory, RiskLevel, TerminationReason, ThresholdBand,
};
use crate::services::parameters::ParameterPublisher;
use crate::services::statistics::variance;

const WEIGHT_MIN: f64 = 0.1;
const WEIGHT_MAX: f64 = 3.0;
const WEIGHT_STEP: f64 = 0.2;
const THRESHOLD_STEP: f64 = 0.02;

/// Every tunable quality parameter with its search bounds.
pub fn default_parameter_specs(band: &ThresholdBand) -> Vec<ParameterSpec> {
    let mut specs: Vec<ParameterSpec> = QualityCategory::ALL
        .iter()
        .map(|c| ParameterSpec::new(weight_param(*c), WEIGHT_MIN, WEIGHT_MAX, WEIGHT_STEP))
        .collect();
    specs.push(ParameterSpec::new(PARAM_DEFAULT_THRESHOLD, band.min, band.max, THRESHOLD_STEP));
    specs.push(ParameterSpec::new(PARAM_HARD_FLOOR, HARD_FLOOR_MIN, HARD_FLOOR_MAX, THRESHOLD_STEP));
    specs
}

pub struct Optimizer {
    publisher: Arc<ParameterPublisher>,
    safety: SafetyPredicate,
}

impl Optimizer {
    pub fn new(publisher: Arc<ParameterPublisher>, safety: SafetyPredicate) -> Self {
        Self { publisher, safety }
    }

    /// Search from the live parameters.
    ///
    /// The first iteration evaluates the live set and is the baseline. Each
    /// later iteration perturbs the best set found so far. A critical safety
    /// verdict halts the search and discards the candidate; the live
    /// parameters are then left untouched.
    pub async fn run(
        &self,
        config: &OptimizationConfig,
        objective: &dyn Objective,
    ) -> DomainResult<OptimizationResult> {
        let started = Instant::now();
        let deadline = Duration::from_millis(config.max_duration_ms);
        let base = self.publisher.current();
        let specs = if config.parameters.is_empty() {
            default_parameter_specs(&base.threshold_band)
        } else {
            config.parameters.clone()
        };
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let baseline_set = base.to_parameter_set();
        let baseline_score = match objective.evaluate(&base) {
            Ok(score) => score,
            Err(e) => {
                tracing::info!(objective = objective.name(), error = %e, "Nothing to optimize against");
                return Ok(OptimizationResult {
                    iterations: 0,
                    baseline_score: 0.0,
                    best_score: 0.0,
                    best_parameters: baseline_set,
                    improvement_pct: 0.0,
                    convergence_history: Vec::new(),
                    termination: TerminationReason::NoData,
                    safety_violation: None,
                    published_version: None,
                });
            }
        };

        let mut history = vec![point(1, baseline_score, &baseline_set)];
        let mut best_set = baseline_set;
        let mut best_score = baseline_score;
        let mut termination = TerminationReason::MaxIterations;
        let mut safety_violation = None;
        let mut iterations = 1;

        tracing::info!(
            objective = objective.name(),
            baseline_score,
            max_iterations = config.max_iterations,
            "Optimization started"
        );

        for iteration in 2..=config.max_iterations.max(1) {
            tokio::task::yield_now().await;
            if started.elapsed() >= deadline {
                termination = TerminationReason::Timeout;
                break;
            }

            let candidate_set = perturb(&best_set, &specs, &mut rng);
            let candidate = base.with_parameter_set(&candidate_set);

            let verdict = self.safety.assess(&candidate, &base);
            if verdict.is_critical() {
                let reason = verdict.reasons.join("; ");
                tracing::warn!(iteration, %reason, "Optimization halted by safety predicate");
                termination = TerminationReason::SafetyViolation;
                safety_violation = Some(reason);
                break;
            }
            if verdict.risk == RiskLevel::High {
                tracing::warn!(iteration, reasons = ?verdict.reasons, "High-risk candidate");
            }

            let score = match objective.evaluate(&candidate) {
                Ok(score) => score,
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "Candidate evaluation failed");
                    continue;
                }
            };
            iterations = iteration;
            history.push(point(iteration, score, &candidate_set));
            if score > best_score {
                tracing::debug!(iteration, score, previous = best_score, "New best candidate");
                best_score = score;
                best_set = candidate_set;
            }

            if converged(&history, config.convergence_window, config.convergence_epsilon) {
                termination = TerminationReason::Converged;
                break;
            }
        }

        let improvement_pct = if baseline_score > 0.0 {
            (best_score - baseline_score) / baseline_score * 100.0
        } else {
            0.0
        };

        let published_version = if config.publish
            && termination != TerminationReason::SafetyViolation
            && best_score > baseline_score
        {
            match self.publisher.publish_set(&best_set).await {
                Ok(version) => Some(version),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to publish optimized parameters");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            iterations,
            baseline_score,
            best_score,
            improvement_pct,
            termination = %termination,
            published_version,
            "Optimization finished"
        );

        Ok(OptimizationResult {
            iterations,
            baseline_score,
            best_score,
            best_parameters: best_set,
            improvement_pct,
            convergence_history: history,
            termination,
            safety_violation,
            published_version,
        })
    }
}

fn point(iteration: u32, score: f64, parameters: &ParameterSet) -> ConvergencePoint {
    ConvergencePoint {
        iteration,
        score,
        parameters: parameters.clone(),
        timestamp: Utc::now(),
    }
}

/// Move every searched parameter by a uniform step, within its bounds.
fn perturb(current: &ParameterSet, specs: &[ParameterSpec], rng: &mut StdRng) -> ParameterSet {
    let mut next = current.clone();
    for spec in specs {
        let value = current.get(&spec.name).copied().unwrap_or((spec.min + spec.max) / 2.0);
        let delta = if spec.step > 0.0 {
            rng.gen_range(-spec.step..=spec.step)
        } else {
            0.0
        };
        next.insert(spec.name.clone(), spec.clamp(value + delta));
    }
    next
}

fn converged(history: &[ConvergencePoint], window: usize, epsilon: f64) -> bool {
    if window < 2 || history.len() < window {
        return false;
    }
    let recent: Vec<f64> = history[history.len() - window..].iter().map(|p| p.score).collect();
    variance(&recent).is_some_and(|v| v < epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{QualityMetric, QualityParameters};
    use crate::services::optimization::ReplayObjective;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flat;

    impl Objective for Flat {
        fn name(&self) -> &str {
            "flat"
        }
        fn evaluate(&self, _params: &QualityParameters) -> DomainResult<f64> {
            Ok(0.5)
        }
    }

    fn optimizer() -> (Optimizer, Arc<ParameterPublisher>) {
        let publisher = Arc::new(ParameterPublisher::new(QualityParameters::default()));
        let safety = SafetyPredicate::new(ThresholdBand::default(), 0.6);
        (Optimizer::new(publisher.clone(), safety), publisher)
    }

    fn config(max_iterations: u32) -> OptimizationConfig {
        OptimizationConfig {
            max_iterations,
            seed: Some(7),
            publish: true,
            ..OptimizationConfig::default()
        }
    }

    /// History where the recorded verdicts follow a stricter threshold than
    /// the default.
    fn strict_history() -> Vec<QualityMetric> {
        (0..40)
            .map(|i| {
                let score = 0.6 + 0.01 * f64::from(i);
                let mut category_scores = BTreeMap::new();
                for category in QualityCategory::ALL {
                    category_scores.insert(category, score);
                }
                QualityMetric {
                    timestamp: Utc::now(),
                    subagent_id: "a".to_string(),
                    session_id: None,
                    quality_score: score,
                    passed: score >= 0.85,
                    processing_time_ms: 1,
                    refinement_attempts: 0,
                    category_scores,
                    critical_issues: vec![],
                    experiment_id: None,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_flat_objective_converges() {
        let (optimizer, publisher) = optimizer();
        let result = optimizer.run(&config(50), &Flat).await.unwrap();

        assert_eq!(result.termination, TerminationReason::Converged);
        assert_eq!(result.iterations, 5);
        assert!((result.improvement_pct - 0.0).abs() < f64::EPSILON);
        assert!(result.published_version.is_none());
        assert_eq!(publisher.version(), 0);
    }

    #[tokio::test]
    async fn test_search_never_worse_than_baseline() {
        let (optimizer, publisher) = optimizer();
        let objective = ReplayObjective::new(strict_history(), 0.85);

        let result = optimizer.run(&config(30), &objective).await.unwrap();

        assert!(result.iterations <= 30);
        assert!(result.best_score >= result.baseline_score);
        assert_eq!(result.convergence_history[0].iteration, 1);
        match result.published_version {
            Some(version) => {
                assert!(result.best_score > result.baseline_score);
                assert_eq!(publisher.version(), version);
            }
            None => assert_eq!(publisher.version(), 0),
        }
    }

    #[tokio::test]
    async fn test_critical_candidate_halts_without_publishing() {
        let (optimizer, publisher) = optimizer();
        let mut config = config(20);
        config.parameters = vec![ParameterSpec::new(weight_param(QualityCategory::Format), 50.0, 60.0, 1.0)];

        let result = optimizer.run(&config, &Flat).await.unwrap();

        assert_eq!(result.termination, TerminationReason::SafetyViolation);
        assert!(result.safety_violation.unwrap().contains("cap"));
        assert_eq!(result.iterations, 1);
        assert!(result.published_version.is_none());
        assert_eq!(publisher.version(), 0);
    }

    /// Flat objective that records how far a concurrent ticker has advanced.
    struct Watching {
        ticks: Arc<AtomicUsize>,
        seen: AtomicUsize,
    }

    impl Objective for Watching {
        fn name(&self) -> &str {
            "watching"
        }
        fn evaluate(&self, _params: &QualityParameters) -> DomainResult<f64> {
            self.seen.fetch_max(self.ticks.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(0.5)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_search_lets_other_tasks_run() {
        let (optimizer, _publisher) = optimizer();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            }
        });
        let objective = Watching {
            ticks,
            seen: AtomicUsize::new(0),
        };

        let result = optimizer.run(&config(50), &objective).await.unwrap();
        ticker.abort();

        assert!(result.iterations > 1);
        assert!(objective.seen.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_empty_objective_reports_no_data() {
        let (optimizer, _publisher) = optimizer();
        let objective = ReplayObjective::new(vec![], 0.85);
        let result = optimizer.run(&config(10), &objective).await.unwrap();
        assert_eq!(result.termination, TerminationReason::NoData);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_perturb_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let specs = default_parameter_specs(&ThresholdBand::default());
        let mut set = QualityParameters::default().to_parameter_set();
        for _ in 0..200 {
            set = perturb(&set, &specs, &mut rng);
            for spec in &specs {
                let value = set[&spec.name];
                assert!(value >= spec.min && value <= spec.max, "{} = {value}", spec.name);
            }
        }
    }
}
