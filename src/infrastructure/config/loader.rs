use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid threshold band: [{0}, {1}]. Bounds must satisfy 0 <= min <= max <= 1")]
    InvalidThresholdBand(f64, f64),

    #[error("Invalid default threshold: {0}. Must lie inside the threshold band")]
    InvalidDefaultThreshold(f64),

    #[error("Invalid hard floor: {0}. Must be between 0 and 1")]
    InvalidHardFloor(f64),

    #[error("Invalid category weight for {0}: must be finite and non-negative")]
    InvalidWeight(String),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid max_concurrent_tasks: {0}. Cannot be 0")]
    InvalidConcurrency(usize),

    #[error("Invalid refinement success floor: {0}. Must be between 0 and 1")]
    InvalidSuccessFloor(f64),

    #[error("Invalid max_records_per_key: {0}. Cannot be 0")]
    InvalidRingCapacity(usize),

    #[error("Invalid retention_days: {0}. Cannot be 0")]
    InvalidRetention(u32),

    #[error("Invalid prediction.{0}: cannot be 0")]
    InvalidPredictionWindow(&'static str),

    #[error("Data directory cannot be empty")]
    EmptyDataDir,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .overseer/config.yaml (project config)
    /// 3. .overseer/local.yaml (project local overrides, optional)
    /// 4. Environment variables (OVERSEER_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".overseer/config.yaml"))
            .merge(Yaml::file(".overseer/local.yaml"))
            .merge(Env::prefixed("OVERSEER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("OVERSEER_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let quality = &config.quality;
        let (min, max) = (quality.threshold_band_min, quality.threshold_band_max);
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            return Err(ConfigError::InvalidThresholdBand(min, max));
        }

        if quality.default_threshold < min || quality.default_threshold > max {
            return Err(ConfigError::InvalidDefaultThreshold(quality.default_threshold));
        }

        if !(0.0..=1.0).contains(&quality.hard_floor) {
            return Err(ConfigError::InvalidHardFloor(quality.hard_floor));
        }

        for category in crate::domain::models::QualityCategory::ALL {
            let weight = quality.weights.get(category);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight(category.to_string()));
            }
        }
        if quality.weights.total() <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "at least one category weight must be positive".to_string(),
            ));
        }

        if config.refinement.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.refinement.max_attempts));
        }

        if config.refinement.max_concurrent_tasks == 0 {
            return Err(ConfigError::InvalidConcurrency(
                config.refinement.max_concurrent_tasks,
            ));
        }

        if !(0.0..=1.0).contains(&config.refinement.min_success_probability) {
            return Err(ConfigError::InvalidSuccessFloor(
                config.refinement.min_success_probability,
            ));
        }

        if config.storage.data_dir.is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }

        if config.storage.max_records_per_key == 0 {
            return Err(ConfigError::InvalidRingCapacity(
                config.storage.max_records_per_key,
            ));
        }

        if config.storage.retention_days == 0 {
            return Err(ConfigError::InvalidRetention(config.storage.retention_days));
        }

        let prediction = &config.prediction;
        for (name, value) in [
            ("min_history", prediction.min_history),
            ("history_window", prediction.history_window),
            ("anomaly_window", prediction.anomaly_window),
            ("anomaly_min_window", prediction.anomaly_min_window),
            ("max_forecast_horizon", prediction.max_forecast_horizon),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidPredictionWindow(name));
            }
        }

        let holdout = config.optimization.holdout_fraction;
        if !(holdout > 0.0 && holdout <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "optimization.holdout_fraction must be in (0, 1], got {holdout}"
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refinement.max_attempts, 3);
        assert_eq!(config.refinement.max_concurrent_tasks, 4);
        assert!((config.quality.hard_floor - 0.5).abs() < f64::EPSILON);
        assert!((config.quality.threshold_band_min - 0.6).abs() < f64::EPSILON);
        assert!((config.quality.threshold_band_max - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.storage.retention_days, 30);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
storage:
  data_dir: /var/lib/overseer
  max_records_per_key: 250
quality:
  default_threshold: 0.8
  weights:
    specificity: 2.0
refinement:
  max_attempts: 5
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.storage.data_dir, "/var/lib/overseer");
        assert_eq!(config.storage.max_records_per_key, 250);
        assert_eq!(config.storage.retention_days, 30);
        assert!((config.quality.default_threshold - 0.8).abs() < f64::EPSILON);
        assert!((config.quality.weights.specificity - 2.0).abs() < f64::EPSILON);
        assert!((config.quality.weights.format - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.refinement.max_attempts, 5);
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_inverted_band() {
        let mut config = Config::default();
        config.quality.threshold_band_min = 0.9;
        config.quality.threshold_band_max = 0.6;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidThresholdBand(_, _)
        ));
    }

    #[test]
    fn test_validate_default_threshold_outside_band() {
        let mut config = Config::default();
        config.quality.default_threshold = 0.95;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidDefaultThreshold(_)
        ));
    }

    #[test]
    fn test_validate_negative_weight() {
        let mut config = Config::default();
        config.quality.weights.format = -1.0;

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidWeight(category) => assert_eq!(category, "format"),
            other => panic!("Expected InvalidWeight error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.refinement.max_attempts = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxAttempts(0)
        ));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.refinement.max_concurrent_tasks = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidConcurrency(0)
        ));
    }

    #[test]
    fn test_validate_zero_ring_capacity() {
        let mut config = Config::default();
        config.storage.max_records_per_key = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRingCapacity(0)
        ));
    }

    #[test]
    fn test_validate_zero_prediction_windows() {
        let mut config = Config::default();
        config.prediction.min_history = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPredictionWindow("min_history")
        ));

        let mut config = Config::default();
        config.prediction.history_window = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPredictionWindow("history_window")
        ));

        let mut config = Config::default();
        config.prediction.anomaly_min_window = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPredictionWindow("anomaly_min_window")
        ));
    }

    #[test]
    fn test_validate_empty_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = String::new();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDataDir
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_env_override() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "refinement:\n  max_attempts: 4\nlogging:\n  level: warn").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("OVERSEER_REFINEMENT__MAX_ATTEMPTS", Some("6")),
                ("OVERSEER_STORAGE__RETENTION_DAYS", Some("7")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.refinement.max_attempts, 6, "Env should win over file");
                assert_eq!(config.storage.retention_days, 7);
                assert_eq!(config.logging.level, "warn", "File value should persist");
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "refinement:\n  max_attempts: 2\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "refinement:\n  max_attempts: 8\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.refinement.max_attempts, 8, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
