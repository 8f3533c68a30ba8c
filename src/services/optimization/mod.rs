//! Auto-optimization of the quality parameters.
//!
//! The [`Optimizer`] searches the parameter space against an [`Objective`],
//! vets every candidate with the [`SafetyPredicate`] and adopts the best set
//! through the [`ParameterPublisher`](crate::services::parameters::ParameterPublisher)
//! in one atomic publish.

pub mod objective;
pub mod optimizer;
pub mod safety;

pub use objective::{Objective, ReplayObjective};
pub use optimizer::{default_parameter_specs, Optimizer};
pub use safety::SafetyPredicate;
