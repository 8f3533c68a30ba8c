//! Rolling z-score anomaly detection.

use chrono::{DateTime, Utc};

use crate::domain::models::{Anomaly, AnomalySeverity, MetricStream, PredictionConfig};
use crate::services::statistics::{mean, std_dev};

/// Standard deviation floor for millisecond streams.
const DURATION_MIN_STDDEV: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    z_threshold: f64,
    window: usize,
    min_window: usize,
    score_min_stddev: f64,
}

impl AnomalyDetector {
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            z_threshold: config.anomaly_z_threshold,
            window: config.anomaly_window.max(1),
            min_window: config.anomaly_min_window.max(2),
            score_min_stddev: config.min_stddev,
        }
    }

    fn min_stddev(&self, stream: MetricStream) -> f64 {
        match stream {
            MetricStream::QualityScore => self.score_min_stddev,
            MetricStream::ValidationTime | MetricStream::OperationDuration => DURATION_MIN_STDDEV,
        }
    }

    /// Score each sample against the window of samples preceding it.
    ///
    /// Samples must be in chronological order. The first `min_window`
    /// samples are never flagged.
    pub fn detect(&self, stream: MetricStream, key: &str, samples: &[(DateTime<Utc>, f64)]) -> Vec<Anomaly> {
        let floor = self.min_stddev(stream);
        let values: Vec<f64> = samples.iter().map(|s| s.1).collect();

        let mut anomalies = Vec::new();
        for (index, (timestamp, value)) in samples.iter().enumerate().skip(self.min_window) {
            let window = &values[index.saturating_sub(self.window)..index];
            let (Some(rolling_mean), Some(raw_stddev)) = (mean(window), std_dev(window)) else {
                continue;
            };
            let rolling_stddev = raw_stddev.max(floor);
            let z_score = (value - rolling_mean) / rolling_stddev;

            if let Some(severity) = AnomalySeverity::from_z_score(z_score, self.z_threshold) {
                anomalies.push(Anomaly {
                    stream,
                    key: key.to_string(),
                    index,
                    timestamp: *timestamp,
                    value: *value,
                    rolling_mean,
                    rolling_stddev,
                    z_score,
                    severity,
                });
            }
        }
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        values.iter().map(|v| (Utc::now(), *v)).collect()
    }

    #[test]
    fn test_flags_collapse_amid_cluster() {
        let detector = AnomalyDetector::new(&PredictionConfig::default());
        let series = samples(&[0.9, 0.91, 0.89, 0.9, 0.92, 0.88, 0.9, 0.0]);
        let anomalies = detector.detect(MetricStream::QualityScore, "a", &series);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].index, 7);
        assert_eq!(anomalies[0].severity, AnomalySeverity::High);
        assert!(anomalies[0].z_score < 0.0);
    }

    #[test]
    fn test_values_within_one_stddev_not_flagged() {
        let detector = AnomalyDetector::new(&PredictionConfig::default());
        let series = samples(&[0.7, 0.8, 0.9, 0.7, 0.8, 0.9, 0.75, 0.85, 0.8]);
        assert!(detector.detect(MetricStream::QualityScore, "a", &series).is_empty());
    }

    #[test]
    fn test_short_series_never_flagged() {
        let detector = AnomalyDetector::new(&PredictionConfig::default());
        let series = samples(&[0.9, 0.9, 0.0]);
        assert!(detector.detect(MetricStream::QualityScore, "a", &series).is_empty());
    }

    #[test]
    fn test_duration_spike() {
        let detector = AnomalyDetector::new(&PredictionConfig::default());
        let series = samples(&[100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 450.0]);
        let anomalies = detector.detect(MetricStream::OperationDuration, "assess", &series);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, AnomalySeverity::High);
    }
}
