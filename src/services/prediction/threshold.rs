//! Adaptive per-subagent pass threshold.

use crate::domain::models::QualityParameters;
use crate::services::statistics::percentile;

const THRESHOLD_PERCENTILE: f64 = 0.10;

/// 10th percentile of the passing scores, clipped to the parameter band.
///
/// With fewer than `min_samples` passing scores the default threshold is
/// used, clipped to the same band.
pub fn adaptive_threshold(passing_scores: &[f64], params: &QualityParameters, min_samples: usize) -> f64 {
    let raw = if passing_scores.len() < min_samples.max(1) {
        params.default_threshold
    } else {
        percentile(passing_scores, THRESHOLD_PERCENTILE).unwrap_or(params.default_threshold)
    };
    params.threshold_band.clip(raw)
}
