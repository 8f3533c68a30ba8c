//! Ensemble prediction engine.
//!
//! Reads the analytics store and answers four kinds of question:
//!
//! - what score will a subagent's next response get ([`PredictionEngine::predict`])
//! - is another refinement attempt likely to pass
//!   ([`PredictionEngine::refinement_success_probability`])
//! - which recent samples are anomalous ([`PredictionEngine::detect_anomalies`])
//! - where is a subagent's quality heading ([`PredictionEngine::forecast`])
//!
//! Every answer is advisory. Callers on the assess/refine path treat a
//! [`DomainError::PredictionUnavailable`] as "no opinion".

pub mod anomaly;
pub mod ensemble;
pub mod forecast;
pub mod models;
pub mod threshold;

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Anomaly, EnsemblePrediction, MetricStream, PredictionConfig, PredictionRequest,
    QualityForecast, QualityParameters,
};
use crate::services::analytics_store::AnalyticsStore;

pub use anomaly::AnomalyDetector;
pub use ensemble::EnsemblePredictor;
pub use models::{ModelInput, PredictionFeedback, PredictionModel};
pub use threshold::adaptive_threshold;

/// Score gap to the threshold at which closeness reaches zero.
const CLOSENESS_RANGE: f64 = 0.5;

pub struct PredictionEngine {
    store: Arc<AnalyticsStore>,
    config: PredictionConfig,
    min_passing_samples: usize,
    ensemble: EnsemblePredictor,
    detector: AnomalyDetector,
    feedback: RwLock<HashMap<String, VecDeque<PredictionFeedback>>>,
}

impl PredictionEngine {
    pub fn new(store: Arc<AnalyticsStore>, config: PredictionConfig, min_passing_samples: usize) -> Self {
        Self {
            detector: AnomalyDetector::new(&config),
            ensemble: EnsemblePredictor::with_defaults(),
            store,
            config,
            min_passing_samples,
            feedback: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the model registry.
    pub fn with_ensemble(mut self, ensemble: EnsemblePredictor) -> Self {
        self.ensemble = ensemble;
        self
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Ensemble forecast of the score of the subagent's next response.
    pub async fn predict(&self, request: &PredictionRequest) -> EnsemblePrediction {
        let history = self
            .store
            .quality_history(&request.subagent_id, Some(self.config.history_window))
            .await;
        let feedback = self.feedback_for(&request.subagent_id).await;

        let input = ModelInput {
            request,
            history: &history,
            feedback: &feedback,
            config: &self.config,
        };
        let prediction = self.ensemble.predict(&input);

        tracing::debug!(
            subagent_id = %request.subagent_id,
            final_prediction = prediction.final_prediction,
            confidence = prediction.confidence,
            consensus = prediction.consensus_level,
            fallback = prediction.fallback,
            "Ensemble prediction"
        );
        prediction
    }

    /// Probability that one more refinement attempt passes.
    ///
    /// Blends the smoothed pass rate of the subagent's refined responses with
    /// how close the current score already is to the threshold.
    #[allow(clippy::cast_precision_loss)]
    pub async fn refinement_success_probability(
        &self,
        subagent_id: &str,
        current_score: f64,
        threshold: f64,
    ) -> DomainResult<f64> {
        let history = self
            .store
            .quality_history(subagent_id, Some(self.config.history_window))
            .await;
        if history.len() < self.config.min_history {
            return Err(DomainError::PredictionUnavailable(format!(
                "{} of {} records for {subagent_id}",
                history.len(),
                self.config.min_history
            )));
        }

        let refined: Vec<_> = history.iter().filter(|m| m.refinement_attempts > 0).collect();
        let passed = refined.iter().filter(|m| m.passed).count();
        let historical = (passed as f64 + 1.0) / (refined.len() as f64 + 2.0);
        let gap = (threshold - current_score).max(0.0);
        let closeness = (1.0 - gap / CLOSENESS_RANGE).clamp(0.0, 1.0);

        Ok(0.5 * historical + 0.5 * closeness)
    }

    /// Record how a prediction turned out, for the meta-learning model.
    pub async fn record_outcome(&self, subagent_id: &str, predicted: f64, actual: f64) {
        let mut feedback = self.feedback.write().await;
        let log = feedback.entry(subagent_id.to_string()).or_default();
        log.push_back(PredictionFeedback {
            predicted,
            actual,
            recorded_at: Utc::now(),
        });
        while log.len() > self.config.history_window.max(1) {
            log.pop_front();
        }
    }

    async fn feedback_for(&self, subagent_id: &str) -> Vec<PredictionFeedback> {
        self.feedback
            .read()
            .await
            .get(subagent_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Adaptive pass threshold for the subagent under `params`.
    pub async fn adaptive_threshold(&self, subagent_id: &str, params: &QualityParameters) -> f64 {
        let passing = self.store.passing_scores(subagent_id).await;
        adaptive_threshold(&passing, params, self.min_passing_samples)
    }

    /// Scan the selected stream, or every stream, for anomalies.
    #[allow(clippy::cast_precision_loss)]
    pub async fn detect_anomalies(&self, stream: Option<MetricStream>) -> Vec<Anomaly> {
        let wants = |s: MetricStream| stream.map_or(true, |selected| selected == s);
        let mut anomalies = Vec::new();

        if wants(MetricStream::QualityScore) || wants(MetricStream::ValidationTime) {
            for (subagent, records) in self.store.quality_by_subagent().await {
                if wants(MetricStream::QualityScore) {
                    let samples: Vec<_> = records.iter().map(|m| (m.timestamp, m.quality_score)).collect();
                    anomalies.extend(self.detector.detect(MetricStream::QualityScore, &subagent, &samples));
                }
                if wants(MetricStream::ValidationTime) {
                    let samples: Vec<_> = records
                        .iter()
                        .map(|m| (m.timestamp, m.processing_time_ms as f64))
                        .collect();
                    anomalies.extend(self.detector.detect(MetricStream::ValidationTime, &subagent, &samples));
                }
            }
        }

        if wants(MetricStream::OperationDuration) {
            for (operation, records) in self.store.performance_by_operation().await {
                let samples: Vec<_> = records
                    .iter()
                    .map(|m| (m.timestamp, m.duration_ms as f64))
                    .collect();
                anomalies.extend(self.detector.detect(MetricStream::OperationDuration, &operation, &samples));
            }
        }

        if !anomalies.is_empty() {
            tracing::info!(count = anomalies.len(), "Anomalies detected");
        }
        anomalies
    }

    /// Linear forecast of the subagent's next `horizon` scores.
    pub async fn forecast(&self, subagent_id: &str, horizon: usize) -> DomainResult<QualityForecast> {
        let scores: Vec<f64> = self
            .store
            .quality_history(subagent_id, Some(self.config.forecast_window))
            .await
            .iter()
            .map(|m| m.quality_score)
            .collect();
        forecast::forecast(subagent_id, &scores, horizon, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{QualityMetric, StorageConfig};
    use std::collections::BTreeMap;

    fn store() -> Arc<AnalyticsStore> {
        Arc::new(AnalyticsStore::new(&StorageConfig {
            persist_on_write: false,
            ..StorageConfig::default()
        }))
    }

    fn metric(subagent: &str, score: f64, passed: bool, refinement_attempts: u32) -> QualityMetric {
        QualityMetric {
            timestamp: Utc::now(),
            subagent_id: subagent.to_string(),
            session_id: None,
            quality_score: score,
            passed,
            processing_time_ms: 2,
            refinement_attempts,
            category_scores: BTreeMap::new(),
            critical_issues: vec![],
            experiment_id: None,
        }
    }

    #[tokio::test]
    async fn test_success_probability_requires_history() {
        let engine = PredictionEngine::new(store(), PredictionConfig::default(), 5);
        let err = engine.refinement_success_probability("a", 0.5, 0.75).await.unwrap_err();
        assert!(matches!(err, DomainError::PredictionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_success_probability_blend() {
        let store = store();
        for _ in 0..3 {
            store.record_quality(metric("a", 0.4, false, 1)).await;
        }
        let engine = PredictionEngine::new(store, PredictionConfig::default(), 5);

        // hist = 1/5, closeness = 1 - 0.35/0.5 = 0.3
        let p = engine.refinement_success_probability("a", 0.4, 0.75).await.unwrap();
        assert!((p - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_predict_uses_history() {
        let store = store();
        for score in [0.8, 0.82, 0.81, 0.79] {
            store.record_quality(metric("a", score, true, 0)).await;
        }
        let engine = PredictionEngine::new(store, PredictionConfig::default(), 5);
        let prediction = engine.predict(&PredictionRequest::for_subagent("a")).await;

        assert!(!prediction.fallback);
        assert!(prediction.contributions.len() >= 2);
        assert!((prediction.final_prediction - 0.8).abs() < 0.05);
        assert!(prediction.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_predict_without_history_minimum_falls_back() {
        let config = PredictionConfig { min_history: 0, ..PredictionConfig::default() };
        let engine = PredictionEngine::new(store(), config, 5);
        let prediction = engine.predict(&PredictionRequest::for_subagent("fresh")).await;

        assert!(prediction.fallback);
        assert!(prediction.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_feedback_enables_meta_learning() {
        let store = store();
        for score in [0.7, 0.7, 0.7] {
            store.record_quality(metric("a", score, false, 0)).await;
        }
        let engine = PredictionEngine::new(store, PredictionConfig::default(), 5);
        for _ in 0..3 {
            engine.record_outcome("a", 0.8, 0.7).await;
        }
        let prediction = engine.predict(&PredictionRequest::for_subagent("a")).await;
        assert!(prediction.contributions.iter().any(|c| c.model_id == "meta_learning"));
    }
}
