//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::models::MetricStream;

#[derive(Parser)]
#[command(name = "overseer")]
#[command(about = "Overseer - quality gate and adaptive analytics for sub-agent work", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (replaces .overseer/config.yaml)
    #[arg(short, long, global = true, env = "OVERSEER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Quality trend for one subagent or all of them
    Trends {
        /// Subagent to report on (all subagents when omitted)
        #[arg(short, long)]
        subagent: Option<String>,

        /// Size of the window in days
        #[arg(short, long, default_value = "7")]
        days: u32,
    },

    /// Actionable insights, most severe first
    Insights {
        /// Subagent to report on (all subagents plus system health when omitted)
        #[arg(short, long)]
        subagent: Option<String>,
    },

    /// Overall system health from the last day of operations
    Health,

    /// Export every stored metric as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Samples that deviate from their stream's rolling statistics
    Anomalies {
        /// Stream to scan (every stream when omitted)
        #[arg(short, long, value_enum)]
        stream: Option<StreamArg>,
    },

    /// Linear forecast of a subagent's next scores
    Forecast {
        /// Subagent to forecast
        subagent: String,

        /// Number of future samples to project
        #[arg(long, default_value = "5")]
        horizon: usize,
    },

    /// Adaptive pass threshold a subagent is judged against
    Threshold {
        /// Subagent to report on
        subagent: String,
    },

    /// Search for better quality parameters against stored history
    Optimize {
        /// Maximum number of evaluated candidates
        #[arg(long, default_value = "50")]
        max_iterations: u32,

        /// Wall-clock limit in milliseconds
        #[arg(long, default_value = "30000")]
        max_duration_ms: u64,

        /// Seed for a reproducible search
        #[arg(long)]
        seed: Option<u64>,

        /// Publish the best parameters when they beat the live set
        #[arg(long)]
        publish: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamArg {
    Quality,
    ValidationTime,
    Operations,
}

impl From<StreamArg> for MetricStream {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Quality => Self::QualityScore,
            StreamArg::ValidationTime => Self::ValidationTime,
            StreamArg::Operations => Self::OperationDuration,
        }
    }
}
