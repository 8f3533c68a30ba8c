//! Domain layer for the Overseer quality system
//!
//! This module contains core business types and the ports the system
//! consumes from the outside world.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
