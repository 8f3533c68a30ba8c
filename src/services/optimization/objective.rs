//! Objectives scored by the optimizer.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{QualityMetric, QualityParameters};

const AGREEMENT_WEIGHT: f64 = 0.6;
const PASS_RATE_WEIGHT: f64 = 0.4;

/// Scores a candidate parameter set. Higher is better, in `[0, 1]`.
pub trait Objective: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, params: &QualityParameters) -> DomainResult<f64>;
}

/// Replays held-out quality records under candidate parameters.
///
/// Each record's category scores are re-aggregated with the candidate
/// weights and re-decided against the candidate default threshold (clipped
/// to the band) and hard floor. The score rewards agreement with the
/// recorded verdicts and a pass rate close to the target.
#[derive(Debug, Clone)]
pub struct ReplayObjective {
    records: Vec<QualityMetric>,
    target_pass_rate: f64,
}

impl ReplayObjective {
    /// Records without category scores cannot be replayed and are dropped,
    /// as are experiment records whose verdicts came from variant parameters.
    pub fn new(records: Vec<QualityMetric>, target_pass_rate: f64) -> Self {
        Self {
            records: records
                .into_iter()
                .filter(|m| m.is_live() && !m.category_scores.is_empty())
                .collect(),
            target_pass_rate,
        }
    }

    /// Hold out the newest `fraction` of a chronological history.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn from_history(history: &[QualityMetric], fraction: f64, target_pass_rate: f64) -> Self {
        let take = if history.is_empty() {
            0
        } else {
            ((history.len() as f64 * fraction.clamp(0.0, 1.0)).ceil() as usize).clamp(1, history.len())
        };
        Self::new(history[history.len() - take..].to_vec(), target_pass_rate)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Objective for ReplayObjective {
    fn name(&self) -> &str {
        "replay"
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, params: &QualityParameters) -> DomainResult<f64> {
        if self.records.is_empty() {
            return Err(DomainError::InvalidInput("no held-out records to replay".to_string()));
        }

        let threshold = params.threshold_band.clip(params.default_threshold);
        let mut agreements = 0usize;
        let mut passes = 0usize;
        for record in &self.records {
            let overall = params.weights.weighted_average(&record.category_scores);
            let min_category = record
                .category_scores
                .values()
                .copied()
                .fold(f64::INFINITY, f64::min);
            let passed = overall >= threshold && min_category >= params.hard_floor;
            if passed {
                passes += 1;
            }
            if passed == record.passed {
                agreements += 1;
            }
        }

        let n = self.records.len() as f64;
        let agreement = agreements as f64 / n;
        let pass_rate = passes as f64 / n;
        Ok(AGREEMENT_WEIGHT * agreement
            + PASS_RATE_WEIGHT * (1.0 - (pass_rate - self.target_pass_rate).abs()))
    }
}
