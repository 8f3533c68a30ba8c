//! Reporting commands over the analytics store.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::application::QualitySystem;
use crate::cli::output::{list_table, output, percent, points, render_list, truncate, CommandOutput};
use crate::domain::models::{Insight, QualityTrend, SystemHealth};

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct TrendOutput(pub QualityTrend);

impl CommandOutput for TrendOutput {
    fn to_human(&self) -> String {
        let trend = &self.0;
        let scope = trend.subagent_id.as_deref().unwrap_or("all subagents");
        let mut out = format!("Quality trend for {scope} (last {} days)\n", trend.window_days);
        if trend.sample_count == 0 {
            out.push_str("No quality records in this window.");
            return out;
        }

        let _ = writeln!(out, "Samples:          {}", trend.sample_count);
        let _ = writeln!(out, "Average score:    {}", points(trend.score_average));
        let _ = writeln!(out, "Direction:        {}", trend.score_trend);
        let _ = writeln!(out, "Success rate:     {}", percent(trend.success_rate));
        let _ = writeln!(out, "Refinement rate:  {}", percent(trend.refinement_rate));

        let mut table = list_table(&["category", "average"]);
        for (category, average) in &trend.category_averages {
            table.add_row(vec![category.to_string(), points(*average)]);
        }
        let _ = writeln!(out, "\n{table}");

        if !trend.recommendations.is_empty() {
            out.push_str("\nRecommendations:\n");
            for recommendation in &trend.recommendations {
                let _ = writeln!(out, "  - {recommendation}");
            }
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct InsightsOutput(pub Vec<Insight>);

impl CommandOutput for InsightsOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["severity", "subagent", "title", "recommendation"]);
        for insight in &self.0 {
            table.add_row(vec![
                insight.severity.to_string(),
                insight.subagent_id.clone().unwrap_or_else(|| "-".to_string()),
                insight.title.clone(),
                truncate(insight.recommendation.as_deref().unwrap_or("-"), 60),
            ]);
        }
        render_list("insight", "insights", &table, self.0.len())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct HealthOutput(pub SystemHealth);

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        let health = &self.0;
        format!(
            "Status:            {}\nOperations (24h):  {}\nError rate:        {}\nAvg response time: {:.0}ms",
            health.status,
            health.total_records,
            percent(health.error_rate),
            health.avg_response_time_ms
        )
    }
}

pub async fn handle_trends(system: &QualitySystem, subagent: Option<String>, days: u32, json: bool) -> Result<()> {
    let trend = system.trends(subagent.as_deref(), days).await;
    output(&TrendOutput(trend), json);
    Ok(())
}

pub async fn handle_insights(system: &QualitySystem, subagent: Option<String>, json: bool) -> Result<()> {
    let insights = system.insights(subagent.as_deref()).await;
    output(&InsightsOutput(insights), json);
    Ok(())
}

pub async fn handle_health(system: &QualitySystem, json: bool) -> Result<()> {
    let health = system.system_health().await;
    output(&HealthOutput(health), json);
    Ok(())
}

/// Export is always JSON; `--json` only affects the summary line.
pub async fn handle_export(system: &QualitySystem, destination: Option<PathBuf>, json: bool) -> Result<()> {
    let export = system.export_analytics().await;
    let body = serde_json::to_string_pretty(&export).context("Failed to serialize analytics export")?;

    match destination {
        Some(path) => {
            tokio::fs::write(&path, body)
                .await
                .with_context(|| format!("Failed to write export to {}", path.display()))?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "path": path.display().to_string(), "records": export.total_records() })
                );
            } else {
                println!("Exported {} records to {}", export.total_records(), path.display());
            }
        }
        None => println!("{body}"),
    }
    Ok(())
}
