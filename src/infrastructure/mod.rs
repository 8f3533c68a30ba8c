//! Infrastructure layer module
//!
//! Adapters the services depend on:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Crash-safe analytics storage (JSON files with atomic replacement)

pub mod config;
pub mod logging;
pub mod storage;
