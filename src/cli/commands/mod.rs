//! CLI command implementations.

pub mod analytics;
pub mod optimize;
pub mod prediction;

use anyhow::Result;

use crate::application::QualitySystem;
use crate::cli::types::Commands;

/// Route a parsed command to its handler.
pub async fn execute(command: Commands, system: &QualitySystem, json: bool) -> Result<()> {
    match command {
        Commands::Trends { subagent, days } => analytics::handle_trends(system, subagent, days, json).await,
        Commands::Insights { subagent } => analytics::handle_insights(system, subagent, json).await,
        Commands::Health => analytics::handle_health(system, json).await,
        Commands::Export { output } => analytics::handle_export(system, output, json).await,
        Commands::Anomalies { stream } => prediction::handle_anomalies(system, stream, json).await,
        Commands::Forecast { subagent, horizon } => {
            prediction::handle_forecast(system, subagent, horizon, json).await
        }
        Commands::Threshold { subagent } => prediction::handle_threshold(system, subagent, json).await,
        Commands::Optimize {
            max_iterations,
            max_duration_ms,
            seed,
            publish,
        } => optimize::handle_optimize(system, max_iterations, max_duration_ms, seed, publish, json).await,
    }
}
