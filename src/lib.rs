//! Overseer - quality gate, refinement loop and adaptive analytics
//!
//! Overseer judges the output of delegated sub-agents, retries with feedback
//! when a result falls short, and learns from the accumulated history to tune
//! its own thresholds and weights.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the sub-agent port
//! - **Service Layer** (`services`): Validator, refinement controller,
//!   analytics store, prediction, optimization and experiments
//! - **Application Layer** (`application`): The `QualitySystem` facade
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging and
//!   crash-safe storage
//! - **CLI Layer** (`cli`): Reporting commands
//!
//! # Example
//!
//! ```no_run
//! use overseer::application::QualitySystem;
//! use overseer::domain::models::Config;
//!
//! #[tokio::main]
//! async fn main() -> overseer::DomainResult<()> {
//!     let system = QualitySystem::open(&Config::default()).await?;
//!     let health = system.system_health().await;
//!     println!("{}", health.status);
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::QualitySystem;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, QualityAssessment, QualityParameters, TaskRunResult, TaskSpec, TaskStatus,
    ValidationContext,
};
pub use domain::ports::SubagentInvoker;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AnalyticsStore, QualityValidator, RefinementController};
