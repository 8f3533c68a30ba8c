//! Domain models for the quality gate, refinement loop and analytics layer.

pub mod config;
pub mod experiment;
pub mod metrics;
pub mod optimization;
pub mod parameters;
pub mod prediction;
pub mod quality;
pub mod task;
pub mod trend;

pub use config::{
    Config, ExperimentsConfig, LoggingConfig, MaintenanceConfig, OptimizationSettings,
    PredictionConfig, QualityConfig, RefinementConfig, StorageConfig,
};
pub use experiment::{AbRecommendation, AbTestConfig, AbTestResult, VariantConfig, VariantStats};
pub use metrics::{
    PerformanceMetric, QualityMetric, TaskComplexity, Timestamped, UsageMetric,
};
pub use optimization::{
    ConvergencePoint, OptimizationConfig, OptimizationResult, ParameterSpec, RiskLevel,
    SafetyAssessment, TerminationReason,
};
pub use parameters::{CategoryWeights, ParameterSet, QualityParameters, ThresholdBand};
pub use prediction::{
    Anomaly, AnomalySeverity, EnsemblePrediction, MetricStream, ModelPrediction,
    PredictionRequest, QualityForecast,
};
pub use quality::{
    QualityAssessment, QualityCategory, QualityRuleResult, ValidationContext,
};
pub use task::{
    AttemptRecord, RefinementMachine, RefinementState, SubagentRequest, SubagentResponse,
    TaskRunResult, TaskSpec, TaskStatus,
};
pub use trend::{
    AnalyticsExport, HealthStatus, Insight, InsightSeverity, QualityTrend, SystemHealth,
    TrendDirection,
};
