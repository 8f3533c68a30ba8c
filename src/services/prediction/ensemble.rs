//! Confidence-weighted ensemble of the registered predictors.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::models::{
    HistoricalAverageModel, MetaLearningModel, ModelEstimate, ModelInput, PatternSimilarityModel,
    PredictionModel, SubagentSpecialistModel,
};
use crate::domain::models::{EnsemblePrediction, ModelPrediction};
use crate::domain::models::quality::clamp_score;
use crate::services::statistics::{mean, variance};

/// Lowest confidence an ensemble ever reports.
pub const MIN_CONFIDENCE: f64 = 0.01;
/// Consensus below this no longer lowers confidence further.
const CONSENSUS_FLOOR: f64 = 0.3;
const NEUTRAL_PRIOR: f64 = 0.5;
const PRIOR_CONFIDENCE: f64 = 0.2;
const SPARSE_HISTORY_CONFIDENCE: f64 = 0.3;

#[derive(Clone, Default)]
pub struct EnsemblePredictor {
    models: BTreeMap<String, Arc<dyn PredictionModel>>,
}

impl EnsemblePredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensemble with the four built-in models.
    pub fn with_defaults() -> Self {
        let mut ensemble = Self::new();
        ensemble.register(Arc::new(HistoricalAverageModel));
        ensemble.register(Arc::new(PatternSimilarityModel));
        ensemble.register(Arc::new(SubagentSpecialistModel));
        ensemble.register(Arc::new(MetaLearningModel));
        ensemble
    }

    pub fn register(&mut self, model: Arc<dyn PredictionModel>) {
        self.models.insert(model.id().to_string(), model);
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Combine every model that can predict. Falls back to a historical
    /// average over whatever history exists when none can.
    pub fn predict(&self, input: &ModelInput<'_>) -> EnsemblePrediction {
        let mut contributions = Vec::new();
        for (id, model) in &self.models {
            let started = Instant::now();
            match model.predict(input) {
                Ok(estimate) => contributions.push(stamp(id, estimate, started)),
                Err(e) => tracing::debug!(model = %id, reason = %e, "Model skipped"),
            }
        }

        if contributions.is_empty() {
            return self.fallback(input);
        }
        combine(contributions)
    }

    fn fallback(&self, input: &ModelInput<'_>) -> EnsemblePrediction {
        let started = Instant::now();
        let scores: Vec<f64> = input.history.iter().map(|m| m.quality_score).collect();
        let (prediction, confidence, rationale) = match mean(&scores) {
            Some(avg) => (
                avg,
                SPARSE_HISTORY_CONFIDENCE,
                format!("Sparse history: mean of {} scores", scores.len()),
            ),
            None => (NEUTRAL_PRIOR, PRIOR_CONFIDENCE, "No history: neutral prior".to_string()),
        };

        let confidence = (confidence * input.config.fallback_confidence_factor).max(MIN_CONFIDENCE);
        let contribution = stamp(
            "historical_average",
            ModelEstimate {
                prediction: clamp_score(prediction),
                confidence,
                rationale,
                contributing_factors: BTreeMap::new(),
            },
            started,
        );

        tracing::debug!(
            subagent_id = %input.request.subagent_id,
            prediction = contribution.prediction,
            confidence,
            "No model could predict, using fallback"
        );

        EnsemblePrediction {
            final_prediction: contribution.prediction,
            confidence,
            contributions: vec![contribution],
            consensus_level: 1.0,
            fallback: true,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stamp(id: &str, estimate: ModelEstimate, started: Instant) -> ModelPrediction {
    ModelPrediction {
        model_id: id.to_string(),
        prediction: estimate.prediction,
        confidence: estimate.confidence,
        rationale: estimate.rationale,
        contributing_factors: estimate.contributing_factors,
        processing_time_ms: (started.elapsed().as_millis() as u64).max(1),
    }
}

/// Confidence-weighted vote over the contributions.
pub fn combine(contributions: Vec<ModelPrediction>) -> EnsemblePrediction {
    let weight: f64 = contributions.iter().map(|c| c.confidence).sum();
    let predictions: Vec<f64> = contributions.iter().map(|c| c.prediction).collect();
    let final_prediction = if weight > 0.0 {
        clamp_score(
            contributions
                .iter()
                .map(|c| c.prediction * c.confidence)
                .sum::<f64>()
                / weight,
        )
    } else {
        clamp_score(mean(&predictions).unwrap_or(NEUTRAL_PRIOR))
    };

    let consensus_level = (1.0 - variance(&predictions).unwrap_or(0.0).sqrt()).max(0.0);
    let confidences: Vec<f64> = contributions.iter().map(|c| c.confidence).collect();
    let confidence =
        (mean(&confidences).unwrap_or(0.0) * consensus_level.max(CONSENSUS_FLOOR)).max(MIN_CONFIDENCE);

    EnsemblePrediction {
        final_prediction,
        confidence,
        contributions,
        consensus_level,
        fallback: false,
    }
}
