pub mod analytics_store;
pub mod experiments;
pub mod maintenance_daemon;
pub mod optimization;
pub mod parameters;
pub mod prediction;
pub mod quality_validator;
pub mod refinement_controller;
pub mod rules;
pub mod statistics;
pub mod trend_analyzer;

pub use analytics_store::{AnalyticsStore, PruneReport, RecordCounts};
pub use experiments::ExperimentManager;
pub use maintenance_daemon::{
    DaemonHandle, DaemonStatus, MaintenanceDaemon, MaintenanceDaemonConfig, MaintenanceEvent,
    MaintenanceReport, StopReason,
};
pub use optimization::{Objective, Optimizer, ReplayObjective, SafetyPredicate};
pub use parameters::ParameterPublisher;
pub use prediction::PredictionEngine;
pub use quality_validator::QualityValidator;
pub use refinement_controller::{RefinementController, RefinementError};
pub use rules::RuleRegistry;
pub use trend_analyzer::TrendAnalyzer;
