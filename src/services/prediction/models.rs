//! Heuristic predictors combined by the ensemble.
//!
//! Every model predicts the quality score a subagent's next response will
//! receive, with a confidence in `(0, 1]`. Models refuse with
//! [`DomainError::PredictionUnavailable`] when they lack the history they
//! need; the ensemble skips them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PredictionConfig, PredictionRequest, QualityCategory, QualityMetric};
use crate::domain::models::quality::clamp_score;
use crate::services::statistics::{linear_fit, mean, std_dev};

/// A recorded (predicted, actual) pair for one subagent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeedback {
    pub predicted: f64,
    pub actual: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PredictionFeedback {
    pub fn residual(&self) -> f64 {
        self.actual - self.predicted
    }
}

/// Everything a model may look at.
pub struct ModelInput<'a> {
    pub request: &'a PredictionRequest,
    /// The subagent's recent quality records, oldest first.
    pub history: &'a [QualityMetric],
    pub feedback: &'a [PredictionFeedback],
    pub config: &'a PredictionConfig,
}

impl ModelInput<'_> {
    fn scores(&self) -> Vec<f64> {
        self.history.iter().map(|m| m.quality_score).collect()
    }

    fn require_history(&self, model: &str) -> DomainResult<()> {
        if self.history.is_empty() || self.history.len() < self.config.min_history {
            return Err(DomainError::PredictionUnavailable(format!(
                "{model}: {} of {} required records for {}",
                self.history.len(),
                self.config.min_history,
                self.request.subagent_id
            )));
        }
        Ok(())
    }
}

/// Raw model verdict; the ensemble stamps the model id and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEstimate {
    pub prediction: f64,
    pub confidence: f64,
    pub rationale: String,
    pub contributing_factors: BTreeMap<String, f64>,
}

impl ModelEstimate {
    fn new(prediction: f64, confidence: f64, rationale: String) -> Self {
        Self {
            prediction: clamp_score(prediction),
            confidence: confidence.clamp(0.01, 1.0),
            rationale,
            contributing_factors: BTreeMap::new(),
        }
    }

    fn factor(mut self, name: &str, value: f64) -> Self {
        self.contributing_factors.insert(name.to_string(), value);
        self
    }
}

pub trait PredictionModel: Send + Sync {
    /// Unique model id, used as the registry key.
    fn id(&self) -> &str;

    fn predict(&self, input: &ModelInput<'_>) -> DomainResult<ModelEstimate>;
}

// ---------------------------------------------------------------------------
// HistoricalAverageModel
// ---------------------------------------------------------------------------

/// Mean of the recent scores; confidence grows with sample count and shrinks
/// with spread.
pub struct HistoricalAverageModel;

impl PredictionModel for HistoricalAverageModel {
    fn id(&self) -> &str {
        "historical_average"
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict(&self, input: &ModelInput<'_>) -> DomainResult<ModelEstimate> {
        input.require_history(self.id())?;
        let scores = input.scores();
        let avg = mean(&scores).unwrap_or(0.0);
        let spread = std_dev(&scores).unwrap_or(0.0);
        let coverage = (scores.len() as f64 / input.config.history_window.max(1) as f64).min(1.0);
        let confidence = (0.3 + 0.6 * coverage) * (1.0 - spread).max(0.2);

        Ok(ModelEstimate::new(
            avg,
            confidence,
            format!("Mean of {} recent scores", scores.len()),
        )
        .factor("sample_count", scores.len() as f64)
        .factor("std_dev", spread))
    }
}

// ---------------------------------------------------------------------------
// PatternSimilarityModel
// ---------------------------------------------------------------------------

/// k-nearest neighbours over category-score vectors of past responses.
pub struct PatternSimilarityModel;

impl PatternSimilarityModel {
    /// Root-mean-square difference over shared categories.
    #[allow(clippy::cast_precision_loss)]
    fn distance(a: &BTreeMap<QualityCategory, f64>, b: &BTreeMap<QualityCategory, f64>) -> Option<f64> {
        let diffs: Vec<f64> = a
            .iter()
            .filter_map(|(category, x)| b.get(category).map(|y| (x - y).powi(2)))
            .collect();
        if diffs.is_empty() {
            return None;
        }
        Some((diffs.iter().sum::<f64>() / diffs.len() as f64).sqrt())
    }
}

impl PredictionModel for PatternSimilarityModel {
    fn id(&self) -> &str {
        "pattern_similarity"
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict(&self, input: &ModelInput<'_>) -> DomainResult<ModelEstimate> {
        if input.request.category_scores.is_empty() {
            return Err(DomainError::PredictionUnavailable(
                "pattern_similarity: no category scores to compare".to_string(),
            ));
        }
        input.require_history(self.id())?;

        let mut neighbours: Vec<(f64, f64)> = input
            .history
            .iter()
            .filter_map(|m| {
                Self::distance(&input.request.category_scores, &m.category_scores)
                    .map(|d| (d, m.quality_score))
            })
            .collect();
        if neighbours.is_empty() {
            return Err(DomainError::PredictionUnavailable(
                "pattern_similarity: no comparable past responses".to_string(),
            ));
        }
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));
        let k = input.config.similarity_neighbors.max(1);
        neighbours.truncate(k);

        let distances: Vec<f64> = neighbours.iter().map(|n| n.0).collect();
        let scores: Vec<f64> = neighbours.iter().map(|n| n.1).collect();
        let avg_distance = mean(&distances).unwrap_or(1.0);
        let fill = neighbours.len() as f64 / k as f64;
        let confidence = (1.0 - avg_distance).max(0.1) * fill;

        Ok(ModelEstimate::new(
            mean(&scores).unwrap_or(0.0),
            confidence,
            format!("{} most similar past responses", neighbours.len()),
        )
        .factor("neighbours", neighbours.len() as f64)
        .factor("mean_distance", avg_distance))
    }
}

// ---------------------------------------------------------------------------
// SubagentSpecialistModel
// ---------------------------------------------------------------------------

const EWMA_ALPHA: f64 = 0.3;
const SLOPE_WINDOW: usize = 10;

/// Exponentially weighted recent level plus the local slope.
pub struct SubagentSpecialistModel;

impl PredictionModel for SubagentSpecialistModel {
    fn id(&self) -> &str {
        "subagent_specialist"
    }

    fn predict(&self, input: &ModelInput<'_>) -> DomainResult<ModelEstimate> {
        input.require_history(self.id())?;
        let scores = input.scores();

        let Some((&first, rest)) = scores.split_first() else {
            return Err(DomainError::PredictionUnavailable(format!(
                "subagent_specialist: no records for {}",
                input.request.subagent_id
            )));
        };
        let level = rest
            .iter()
            .fold(first, |level, score| EWMA_ALPHA * score + (1.0 - EWMA_ALPHA) * level);
        let recent = &scores[scores.len().saturating_sub(SLOPE_WINDOW)..];
        let slope = linear_fit(recent).map_or(0.0, |fit| fit.slope);
        let spread = std_dev(recent).unwrap_or(0.0);

        Ok(ModelEstimate::new(
            level + slope,
            (1.0 - 2.0 * spread).clamp(0.1, 0.85),
            format!("EWMA level {level:.3} with slope {slope:+.3} per response"),
        )
        .factor("ewma_level", level)
        .factor("slope", slope))
    }
}

// ---------------------------------------------------------------------------
// MetaLearningModel
// ---------------------------------------------------------------------------

/// Base estimate corrected by the mean residual of past predictions.
pub struct MetaLearningModel;

impl PredictionModel for MetaLearningModel {
    fn id(&self) -> &str {
        "meta_learning"
    }

    fn predict(&self, input: &ModelInput<'_>) -> DomainResult<ModelEstimate> {
        if input.feedback.len() < input.config.min_history || input.history.is_empty() {
            return Err(DomainError::PredictionUnavailable(format!(
                "meta_learning: {} of {} recorded outcomes for {}",
                input.feedback.len(),
                input.config.min_history,
                input.request.subagent_id
            )));
        }
        let base = input
            .request
            .current_score
            .or_else(|| mean(&input.scores()))
            .unwrap_or(0.0);
        let residuals: Vec<f64> = input.feedback.iter().map(PredictionFeedback::residual).collect();
        let bias = mean(&residuals).unwrap_or(0.0);
        let abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let mae = mean(&abs).unwrap_or(1.0);

        Ok(ModelEstimate::new(
            base + bias,
            (1.0 - mae).clamp(0.1, 0.9),
            format!("Base {base:.3} corrected by mean residual {bias:+.3}"),
        )
        .factor("bias", bias)
        .factor("mean_absolute_error", mae))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(score: f64, format: f64) -> QualityMetric {
        let mut category_scores = BTreeMap::new();
        category_scores.insert(QualityCategory::Format, format);
        QualityMetric {
            timestamp: Utc::now(),
            subagent_id: "a".to_string(),
            session_id: None,
            quality_score: score,
            passed: score >= 0.75,
            processing_time_ms: 1,
            refinement_attempts: 0,
            category_scores,
            critical_issues: vec![],
            experiment_id: None,
        }
    }

    #[test]
    fn test_historical_average_needs_history() {
        let config = PredictionConfig::default();
        let request = PredictionRequest::for_subagent("a");
        let history = vec![metric(0.8, 0.8)];
        let input = ModelInput { request: &request, history: &history, feedback: &[], config: &config };
        assert!(matches!(
            HistoricalAverageModel.predict(&input),
            Err(DomainError::PredictionUnavailable(_))
        ));
    }

    #[test]
    fn test_models_refuse_empty_history_without_minimum() {
        let config = PredictionConfig { min_history: 0, ..PredictionConfig::default() };
        let request = PredictionRequest::for_subagent("fresh");
        let input = ModelInput { request: &request, history: &[], feedback: &[], config: &config };

        assert!(matches!(
            SubagentSpecialistModel.predict(&input),
            Err(DomainError::PredictionUnavailable(_))
        ));
        assert!(matches!(
            HistoricalAverageModel.predict(&input),
            Err(DomainError::PredictionUnavailable(_))
        ));
        assert!(matches!(MetaLearningModel.predict(&input), Err(DomainError::PredictionUnavailable(_))));
    }

    #[test]
    fn test_similarity_prefers_close_neighbours() {
        let config = PredictionConfig { similarity_neighbors: 2, ..PredictionConfig::default() };
        let mut request = PredictionRequest::for_subagent("a");
        request.category_scores.insert(QualityCategory::Format, 0.2);
        let history = vec![metric(0.3, 0.2), metric(0.35, 0.25), metric(0.9, 0.95), metric(0.95, 1.0)];
        let input = ModelInput { request: &request, history: &history, feedback: &[], config: &config };

        let estimate = PatternSimilarityModel.predict(&input).unwrap();
        assert!((estimate.prediction - 0.325).abs() < 1e-9);
    }

    #[test]
    fn test_specialist_follows_trend() {
        let config = PredictionConfig::default();
        let request = PredictionRequest::for_subagent("a");
        let history: Vec<_> = [0.5, 0.6, 0.7, 0.8].iter().map(|s| metric(*s, *s)).collect();
        let input = ModelInput { request: &request, history: &history, feedback: &[], config: &config };

        let estimate = SubagentSpecialistModel.predict(&input).unwrap();
        assert!(estimate.prediction > 0.7);
        assert!((estimate.contributing_factors["slope"] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_meta_learning_corrects_bias() {
        let config = PredictionConfig::default();
        let request = PredictionRequest::for_subagent("a");
        let history: Vec<_> = [0.7, 0.7, 0.7].iter().map(|s| metric(*s, *s)).collect();
        let feedback: Vec<_> = (0..3)
            .map(|_| PredictionFeedback { predicted: 0.8, actual: 0.7, recorded_at: Utc::now() })
            .collect();
        let input = ModelInput { request: &request, history: &history, feedback: &feedback, config: &config };

        let estimate = MetaLearningModel.predict(&input).unwrap();
        assert!((estimate.prediction - 0.6).abs() < 1e-9);
    }
}
