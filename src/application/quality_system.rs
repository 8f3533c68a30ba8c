use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AbTestConfig, AbTestResult, AnalyticsExport, Anomaly, Config, Insight, MetricStream,
    OptimizationConfig, OptimizationResult, QualityAssessment, QualityForecast, QualityParameters,
    QualityTrend, SystemHealth, TaskSpec, TaskRunResult, ValidationContext,
};
use crate::domain::ports::SubagentInvoker;
use crate::services::optimization::{Optimizer, ReplayObjective, SafetyPredicate};
use crate::services::parameters::PARAMETERS_FILE;
use crate::services::{
    AnalyticsStore, ExperimentManager, MaintenanceDaemon, MaintenanceDaemonConfig,
    ParameterPublisher, PredictionEngine, QualityValidator, RefinementController, RuleRegistry,
    TrendAnalyzer,
};

/// Wires the quality gate, refinement loop and analytics layer together
///
/// The `QualitySystem` owns one instance of every service and exposes the
/// operations callers use:
/// - `assess` / `run_task` on the primary path
/// - trends, insights, health, anomalies and forecasts for reporting
/// - experiments and optimization for the adaptive layer
///
/// All services share the same analytics store and parameter publisher, so a
/// publish by the optimizer is picked up by the next assessment.
///
/// # Examples
///
/// ```no_run
/// use overseer::application::QualitySystem;
/// use overseer::domain::models::{Config, ValidationContext};
///
/// # async fn example() -> overseer::DomainResult<()> {
/// let system = QualitySystem::open(&Config::default()).await?;
/// let context = ValidationContext::new("python-specialist", "Write a parser");
/// let assessment = system.assess("def parse(): ...", &context).await;
/// println!("{:.2}", assessment.overall_score);
/// # Ok(())
/// # }
/// ```
pub struct QualitySystem {
    config: Config,
    store: Arc<AnalyticsStore>,
    publisher: Arc<ParameterPublisher>,
    validator: Arc<QualityValidator>,
    prediction: Arc<PredictionEngine>,
    trends: TrendAnalyzer,
    optimizer: Arc<Optimizer>,
    experiments: ExperimentManager,
    controller: Option<RefinementController>,
}

impl QualitySystem {
    /// Open the analytics store and build every service from `config`.
    ///
    /// Persisted parameters from an earlier optimization take precedence over
    /// the configured initial parameters. Fails when a persisted analytics
    /// collection exists but cannot be read.
    pub async fn open(config: &Config) -> DomainResult<Self> {
        let store = Arc::new(AnalyticsStore::open(&config.storage).await?);

        let initial = config.quality.initial_parameters();
        let publisher = if config.optimization.persist_parameters {
            let path = Path::new(&config.storage.data_dir).join(PARAMETERS_FILE);
            ParameterPublisher::persistent(initial, path).await
        } else {
            ParameterPublisher::new(initial)
        };
        let publisher = Arc::new(publisher);

        let rules = RuleRegistry::with_defaults(config.quality.min_response_chars);
        let validator = Arc::new(QualityValidator::new(
            rules,
            store.clone(),
            publisher.subscribe(),
            config.quality.min_passing_samples,
        ));
        let prediction = Arc::new(PredictionEngine::new(
            store.clone(),
            config.prediction.clone(),
            config.quality.min_passing_samples,
        ));
        let safety = SafetyPredicate::new(
            config.quality.threshold_band(),
            config.optimization.max_weight_share,
        );
        let optimizer = Arc::new(Optimizer::new(publisher.clone(), safety));

        info!(
            data_dir = %config.storage.data_dir,
            parameters_version = publisher.version(),
            rules = validator.rules().len(),
            "Quality system ready"
        );

        Ok(Self {
            config: config.clone(),
            trends: TrendAnalyzer::new(store.clone()),
            experiments: ExperimentManager::new(config.experiments.clone()),
            store,
            publisher,
            validator,
            prediction,
            optimizer,
            controller: None,
        })
    }

    /// Attach the sub-agent capability, enabling `run_task`.
    pub fn with_invoker(mut self, invoker: Arc<dyn SubagentInvoker>) -> Self {
        let mut controller = RefinementController::new(
            self.validator.clone(),
            invoker,
            self.store.clone(),
            self.config.refinement.clone(),
        );
        if self.config.refinement.prediction_short_circuit {
            controller = controller.with_prediction(self.prediction.clone());
        }
        self.controller = Some(controller);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<AnalyticsStore> {
        &self.store
    }

    pub fn publisher(&self) -> &Arc<ParameterPublisher> {
        &self.publisher
    }

    pub fn prediction(&self) -> &Arc<PredictionEngine> {
        &self.prediction
    }

    /// Live quality parameters.
    pub fn parameters(&self) -> Arc<QualityParameters> {
        self.publisher.current()
    }

    // ----------------------------------------------------------------------
    // Primary path
    // ----------------------------------------------------------------------

    pub async fn assess(&self, response: &str, context: &ValidationContext) -> QualityAssessment {
        self.validator.assess(response, context).await
    }

    /// Run a task through the refinement loop until it passes, is exhausted
    /// or `cancel` fires.
    #[instrument(skip(self, spec, cancel), fields(task_id = %spec.id, subagent_id = %spec.subagent_id))]
    pub async fn run_task(&self, spec: TaskSpec, cancel: CancellationToken) -> DomainResult<TaskRunResult> {
        let controller = self.controller.as_ref().ok_or_else(|| {
            DomainError::SubagentFailure("no sub-agent invoker configured".to_string())
        })?;
        Ok(controller.run_task(spec, cancel).await?)
    }

    // ----------------------------------------------------------------------
    // Reporting
    // ----------------------------------------------------------------------

    pub async fn trends(&self, subagent_id: Option<&str>, days: u32) -> QualityTrend {
        self.trends.trends(subagent_id, days).await
    }

    pub async fn insights(&self, subagent_id: Option<&str>) -> Vec<Insight> {
        self.trends.insights(subagent_id).await
    }

    pub async fn system_health(&self) -> SystemHealth {
        self.trends.system_health().await
    }

    pub async fn export_analytics(&self) -> AnalyticsExport {
        self.store.export().await
    }

    pub async fn anomalies(&self, stream: Option<MetricStream>) -> Vec<Anomaly> {
        self.prediction.detect_anomalies(stream).await
    }

    pub async fn forecast(&self, subagent_id: &str, horizon: usize) -> DomainResult<QualityForecast> {
        self.prediction.forecast(subagent_id, horizon).await
    }

    /// Adaptive pass threshold the subagent would be judged against now.
    pub async fn threshold(&self, subagent_id: &str) -> f64 {
        let params = self.publisher.current();
        self.prediction.adaptive_threshold(subagent_id, &params).await
    }

    // ----------------------------------------------------------------------
    // Adaptive layer
    // ----------------------------------------------------------------------

    pub async fn configure_experiment(&self, config: AbTestConfig) -> bool {
        self.experiments.configure(config).await
    }

    pub async fn evaluate_experiment(&self, experiment_id: &str) -> DomainResult<AbTestResult> {
        self.experiments.evaluate(experiment_id).await
    }

    pub fn experiments(&self) -> &ExperimentManager {
        &self.experiments
    }

    /// Assess a response under an experiment.
    ///
    /// A variant is drawn by allocation, its parameter overrides are applied on
    /// top of the live parameters and the overall score is recorded as the
    /// variant's observation. The stored quality record is tagged with the
    /// experiment, so it never moves the live adaptive threshold. Returns the
    /// variant name with the assessment.
    pub async fn assess_in_experiment(
        &self,
        experiment_id: &str,
        response: &str,
        context: &ValidationContext,
    ) -> DomainResult<(String, QualityAssessment)> {
        let variant = self.experiments.assign(experiment_id).await?;
        let params = self.publisher.current().with_parameter_set(&variant.parameters);
        let context = context.clone().with_experiment(experiment_id);
        let assessment = self.validator.assess_with_parameters(response, &context, &params).await;
        self.experiments
            .record(experiment_id, &variant.name, assessment.overall_score)
            .await?;
        Ok((variant.name, assessment))
    }

    /// Search for better parameters against the replay of stored history.
    pub async fn run_optimization(&self, config: &OptimizationConfig) -> DomainResult<OptimizationResult> {
        let history = self.store.all_quality().await;
        let settings = &self.config.optimization;
        let objective = ReplayObjective::from_history(&history, settings.holdout_fraction, settings.target_pass_rate);
        if objective.is_empty() {
            warn!("No quality records with category scores; optimization has nothing to replay");
        }
        self.optimizer.run(config, &objective).await
    }

    /// Background maintenance sharing this system's store and optimizer.
    pub fn maintenance_daemon(&self) -> MaintenanceDaemon {
        let config = MaintenanceDaemonConfig::from_config(
            &self.config.maintenance,
            &self.config.storage,
            &self.config.optimization,
        );
        MaintenanceDaemon::new(self.store.clone(), config).with_optimizer(self.optimizer.clone())
    }
}
