//! Live quality parameters.
//!
//! The publisher owns the only writable copy of [`QualityParameters`] and
//! distributes it through a `tokio::sync::watch` channel. Readers take an
//! `Arc` snapshot once per assessment, so a publish is observed all at once
//! on the next assessment and never in the middle of one.

use std::path::PathBuf;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{watch, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ParameterSet, QualityCategory, QualityParameters};
use crate::infrastructure::storage::AtomicJsonFile;

pub const PARAMETERS_FILE: &str = "parameters.json";

pub struct ParameterPublisher {
    tx: watch::Sender<Arc<QualityParameters>>,
    file: Option<AtomicJsonFile>,
    publish_lock: Mutex<()>,
}

impl ParameterPublisher {
    /// In-memory publisher starting from `initial`.
    pub fn new(initial: QualityParameters) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self {
            tx,
            file: None,
            publish_lock: Mutex::new(()),
        }
    }

    /// Publisher that persists every publish to `path` and starts from the
    /// persisted set when one exists and is valid.
    ///
    /// The threshold band always comes from `initial`; the optimizer never
    /// tunes it.
    pub async fn persistent(initial: QualityParameters, path: impl Into<PathBuf>) -> Self {
        let file = AtomicJsonFile::new(path);
        let start = match file.read::<QualityParameters>().await {
            Ok(Some(saved)) => match validate(&saved).and_then(|()| {
                let restored = QualityParameters {
                    threshold_band: initial.threshold_band,
                    ..saved
                };
                validate(&restored).map(|()| restored)
            }) {
                Ok(restored) => {
                    tracing::info!(
                        version = restored.version,
                        path = %file.path().display(),
                        "Restored published quality parameters"
                    );
                    restored
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring invalid persisted parameters");
                    initial
                }
            },
            Ok(None) => initial,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted parameters");
                initial
            }
        };

        let mut publisher = Self::new(start);
        publisher.file = Some(file);
        publisher
    }

    /// Snapshot of the live parameters.
    pub fn current(&self) -> Arc<QualityParameters> {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<QualityParameters>> {
        self.tx.subscribe()
    }

    /// Replace the live parameters in one step. Returns the new version.
    pub async fn publish(&self, next: QualityParameters) -> DomainResult<u64> {
        validate(&next)?;

        let _guard = self.publish_lock.lock().await;
        let version = self.version() + 1;
        let published = Arc::new(QualityParameters {
            version,
            published_at: Utc::now(),
            ..next
        });
        self.tx.send_replace(published.clone());

        tracing::info!(
            version,
            default_threshold = published.default_threshold,
            hard_floor = published.hard_floor,
            "Published quality parameters"
        );

        if let Some(ref file) = self.file {
            if let Err(e) = file.write(published.as_ref()).await {
                tracing::warn!(version, error = %e, "Failed to persist published parameters");
            }
        }

        Ok(version)
    }

    /// Apply named parameter values on top of the live set and publish.
    pub async fn publish_set(&self, set: &ParameterSet) -> DomainResult<u64> {
        let next = self.current().with_parameter_set(set);
        self.publish(next).await
    }
}

/// Structural validity, independent of the optimizer's risk policy.
fn validate(params: &QualityParameters) -> DomainResult<()> {
    for category in QualityCategory::ALL {
        let weight = params.weights.get(category);
        if !weight.is_finite() || weight < 0.0 {
            return Err(DomainError::InvalidInput(format!(
                "weight for {category} must be finite and non-negative, got {weight}"
            )));
        }
    }
    if params.weights.total() <= 0.0 {
        return Err(DomainError::InvalidInput("all category weights are zero".to_string()));
    }
    for (name, value) in [
        ("default threshold", params.default_threshold),
        ("hard floor", params.hard_floor),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(DomainError::InvalidInput(format!("{name} must be in [0, 1], got {value}")));
        }
    }
    let band = params.threshold_band;
    if !(0.0..=1.0).contains(&band.min) || !(0.0..=1.0).contains(&band.max) || band.min > band.max {
        return Err(DomainError::InvalidInput(format!(
            "threshold band [{}, {}] must satisfy 0 <= min <= max <= 1",
            band.min, band.max
        )));
    }
    if !band.contains(params.default_threshold) {
        return Err(DomainError::InvalidInput(format!(
            "default threshold {} lies outside the band [{}, {}]",
            params.default_threshold, band.min, band.max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::parameters::PARAM_DEFAULT_THRESHOLD;
    use crate::domain::models::ThresholdBand;

    #[tokio::test]
    async fn test_publish_bumps_version_and_notifies() {
        let publisher = ParameterPublisher::new(QualityParameters::default());
        let mut rx = publisher.subscribe();
        assert_eq!(publisher.version(), 0);

        let mut set = ParameterSet::new();
        set.insert(PARAM_DEFAULT_THRESHOLD.to_string(), 0.8);
        let version = publisher.publish_set(&set).await.unwrap();

        assert_eq!(version, 1);
        rx.changed().await.unwrap();
        assert!((rx.borrow().default_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_later_publish() {
        let publisher = ParameterPublisher::new(QualityParameters::default());
        let snapshot = publisher.current();

        let mut next = QualityParameters::default();
        next.hard_floor = 0.4;
        publisher.publish(next).await.unwrap();

        assert!((snapshot.hard_floor - 0.5).abs() < f64::EPSILON);
        assert!((publisher.current().hard_floor - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected() {
        let publisher = ParameterPublisher::new(QualityParameters::default());
        let mut bad = QualityParameters::default();
        bad.weights.format = f64::NAN;
        assert!(publisher.publish(bad).await.is_err());
        assert_eq!(publisher.version(), 0);
    }

    #[tokio::test]
    async fn test_persisted_parameters_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PARAMETERS_FILE);

        let publisher = ParameterPublisher::persistent(QualityParameters::default(), &path).await;
        let mut next = QualityParameters::default();
        next.weights.specificity = 2.0;
        publisher.publish(next).await.unwrap();

        let restarted = ParameterPublisher::persistent(QualityParameters::default(), &path).await;
        assert_eq!(restarted.version(), 1);
        assert!((restarted.current().weights.specificity - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_persisted_inverted_band_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PARAMETERS_FILE);
        let mut saved = serde_json::to_value(QualityParameters {
            version: 7,
            ..QualityParameters::default()
        })
        .unwrap();
        saved["threshold_band"] = serde_json::json!({ "min": 0.9, "max": 0.6 });
        std::fs::write(&path, serde_json::to_vec(&saved).unwrap()).unwrap();

        let publisher = ParameterPublisher::persistent(QualityParameters::default(), &path).await;
        let current = publisher.current();
        assert_eq!(current.version, 0);
        assert_eq!(current.threshold_band, ThresholdBand::default());
        assert!((current.threshold_band.clip(0.95) - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_restore_keeps_configured_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PARAMETERS_FILE);
        let saved = QualityParameters {
            version: 3,
            threshold_band: ThresholdBand { min: 0.5, max: 0.95 },
            ..QualityParameters::default()
        };
        std::fs::write(&path, serde_json::to_vec(&saved).unwrap()).unwrap();

        let configured = QualityParameters {
            threshold_band: ThresholdBand { min: 0.65, max: 0.85 },
            ..QualityParameters::default()
        };
        let publisher = ParameterPublisher::persistent(configured, &path).await;
        assert_eq!(publisher.version(), 3);
        assert_eq!(publisher.current().threshold_band, ThresholdBand { min: 0.65, max: 0.85 });
    }

    #[test]
    fn test_band_validation() {
        let mut params = QualityParameters::default();
        params.threshold_band = ThresholdBand { min: f64::NAN, max: 0.9 };
        assert!(validate(&params).is_err());

        params.threshold_band = ThresholdBand { min: 0.8, max: 0.9 };
        assert!(validate(&params).is_err(), "default threshold 0.75 is outside the band");
    }
}
