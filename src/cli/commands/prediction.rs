//! Anomaly, forecast and threshold commands.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

use crate::application::QualitySystem;
use crate::cli::output::{list_table, output, points, render_list, CommandOutput};
use crate::cli::types::StreamArg;
use crate::domain::models::{Anomaly, MetricStream, QualityForecast};

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct AnomaliesOutput(pub Vec<Anomaly>);

impl CommandOutput for AnomaliesOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["severity", "stream", "key", "when", "value", "mean", "z"]);
        for anomaly in &self.0 {
            let (value, mean) = match anomaly.stream {
                MetricStream::QualityScore => (points(anomaly.value), points(anomaly.rolling_mean)),
                MetricStream::ValidationTime | MetricStream::OperationDuration => (
                    format!("{:.0}ms", anomaly.value),
                    format!("{:.0}ms", anomaly.rolling_mean),
                ),
            };
            table.add_row(vec![
                anomaly.severity.to_string(),
                anomaly.stream.to_string(),
                anomaly.key.clone(),
                anomaly.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                value,
                mean,
                format!("{:+.2}", anomaly.z_score),
            ]);
        }
        render_list("anomaly", "anomalies", &table, self.0.len())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ForecastOutput(pub QualityForecast);

impl CommandOutput for ForecastOutput {
    fn to_human(&self) -> String {
        let forecast = &self.0;
        let mut out = format!(
            "Forecast for {} from {} samples: {} ({:+.2} points per sample)\n",
            forecast.subagent_id,
            forecast.sample_count,
            forecast.trend,
            forecast.slope * 100.0
        );
        let mut table = list_table(&["step", "projected", "low", "high"]);
        for (step, (score, (low, high))) in forecast
            .projected_scores
            .iter()
            .zip(&forecast.confidence_intervals)
            .enumerate()
        {
            table.add_row(vec![(step + 1).to_string(), points(*score), points(*low), points(*high)]);
        }
        let _ = write!(out, "{table}");
        out
    }
}

#[derive(Debug, Serialize)]
pub struct ThresholdOutput {
    pub subagent_id: String,
    pub threshold: f64,
    pub parameters_version: u64,
}

impl CommandOutput for ThresholdOutput {
    fn to_human(&self) -> String {
        format!(
            "Adaptive threshold for {}: {} (parameters v{})",
            self.subagent_id,
            points(self.threshold),
            self.parameters_version
        )
    }
}

pub async fn handle_anomalies(system: &QualitySystem, stream: Option<StreamArg>, json: bool) -> Result<()> {
    let anomalies = system.anomalies(stream.map(MetricStream::from)).await;
    output(&AnomaliesOutput(anomalies), json);
    Ok(())
}

pub async fn handle_forecast(system: &QualitySystem, subagent: String, horizon: usize, json: bool) -> Result<()> {
    let forecast = system
        .forecast(&subagent, horizon)
        .await
        .with_context(|| format!("Cannot forecast {subagent}"))?;
    output(&ForecastOutput(forecast), json);
    Ok(())
}

pub async fn handle_threshold(system: &QualitySystem, subagent: String, json: bool) -> Result<()> {
    let threshold = system.threshold(&subagent).await;
    output(
        &ThresholdOutput {
            subagent_id: subagent,
            threshold,
            parameters_version: system.parameters().version,
        },
        json,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TrendDirection;

    #[test]
    fn test_forecast_rows_follow_horizon() {
        let forecast = QualityForecast {
            subagent_id: "a".to_string(),
            horizon: 2,
            sample_count: 6,
            slope: 0.01,
            intercept: 0.7,
            projected_scores: vec![0.76, 0.77],
            confidence_intervals: vec![(0.7, 0.82), (0.7, 0.84)],
            residual_std_error: 0.02,
            trend: TrendDirection::Improving,
        };
        let text = ForecastOutput(forecast).to_human();
        assert!(text.starts_with("Forecast for a from 6 samples: improving (+1.00 points per sample)"));
        assert!(text.contains("76.0"));
        assert!(text.contains("77.0"));
    }

    #[test]
    fn test_threshold_output() {
        let out = ThresholdOutput {
            subagent_id: "a".to_string(),
            threshold: 0.75,
            parameters_version: 3,
        };
        assert_eq!(out.to_human(), "Adaptive threshold for a: 75.0 (parameters v3)");
        assert_eq!(out.to_json()["threshold"], 0.75);
    }
}
