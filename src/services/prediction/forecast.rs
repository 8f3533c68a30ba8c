//! Linear quality forecast.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::quality::clamp_score;
use crate::domain::models::{PredictionConfig, QualityForecast, TrendDirection};
use crate::services::statistics::linear_fit;

/// Fewest scores a forecast is fitted on.
pub const MIN_FORECAST_SAMPLES: usize = 3;
const Z_95: f64 = 1.96;

/// Project `scores` (oldest first) `horizon` responses ahead.
#[allow(clippy::cast_precision_loss)]
pub fn forecast(
    subagent_id: &str,
    scores: &[f64],
    horizon: usize,
    config: &PredictionConfig,
) -> DomainResult<QualityForecast> {
    if horizon == 0 || horizon > config.max_forecast_horizon {
        return Err(DomainError::InvalidInput(format!(
            "forecast horizon must be between 1 and {}, got {horizon}",
            config.max_forecast_horizon
        )));
    }
    let recent = &scores[scores.len().saturating_sub(config.forecast_window.max(MIN_FORECAST_SAMPLES))..];
    if recent.len() < MIN_FORECAST_SAMPLES {
        return Err(DomainError::PredictionUnavailable(format!(
            "forecast for {subagent_id} needs {MIN_FORECAST_SAMPLES} scores, have {}",
            recent.len()
        )));
    }
    let fit = linear_fit(recent).ok_or_else(|| {
        DomainError::PredictionUnavailable(format!("forecast for {subagent_id}: fit failed"))
    })?;

    let margin = Z_95 * fit.residual_std_error;
    let last_x = (recent.len() - 1) as f64;
    let (projected_scores, confidence_intervals) = (1..=horizon)
        .map(|step| {
            let raw = fit.predict(last_x + step as f64);
            (clamp_score(raw), (clamp_score(raw - margin), clamp_score(raw + margin)))
        })
        .unzip();

    let trend = if fit.slope > config.trend_slope_threshold {
        TrendDirection::Improving
    } else if fit.slope < -config.trend_slope_threshold {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    Ok(QualityForecast {
        subagent_id: subagent_id.to_string(),
        horizon,
        sample_count: recent.len(),
        slope: fit.slope,
        intercept: fit.intercept,
        projected_scores,
        confidence_intervals,
        residual_std_error: fit.residual_std_error,
        trend,
    })
}
