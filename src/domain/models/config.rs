use serde::{Deserialize, Serialize};

use super::parameters::{CategoryWeights, QualityParameters, ThresholdBand};

/// Main configuration structure for Overseer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Analytics storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Quality gate configuration
    #[serde(default)]
    pub quality: QualityConfig,

    /// Refinement loop configuration
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Prediction, anomaly and forecast configuration
    #[serde(default)]
    pub prediction: PredictionConfig,

    /// Auto-optimization configuration
    #[serde(default)]
    pub optimization: OptimizationSettings,

    /// A/B experiment configuration
    #[serde(default)]
    pub experiments: ExperimentsConfig,

    /// Background maintenance configuration
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analytics storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Directory holding the metric logs
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum records kept per subagent/operation key
    #[serde(default = "default_max_records_per_key")]
    pub max_records_per_key: usize,

    /// Records older than this are pruned by the maintenance sweep
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Persist the affected log after every append
    #[serde(default = "default_true")]
    pub persist_on_write: bool,
}

fn default_data_dir() -> String {
    ".overseer/analytics".to_string()
}

const fn default_max_records_per_key() -> usize {
    1000
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_records_per_key: default_max_records_per_key(),
            retention_days: default_retention_days(),
            persist_on_write: default_true(),
        }
    }
}

/// Quality gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QualityConfig {
    /// Threshold used until a subagent has enough passing history
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Minimum score every category must reach
    #[serde(default = "default_hard_floor")]
    pub hard_floor: f64,

    /// Lower bound of the adaptive threshold band
    #[serde(default = "default_band_min")]
    pub threshold_band_min: f64,

    /// Upper bound of the adaptive threshold band
    #[serde(default = "default_band_max")]
    pub threshold_band_max: f64,

    /// Passing samples required before the adaptive threshold is used
    #[serde(default = "default_min_passing_samples")]
    pub min_passing_samples: usize,

    /// Responses shorter than this are penalized by the format rule
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,

    /// Initial category weights
    #[serde(default)]
    pub weights: CategoryWeights,
}

const fn default_threshold() -> f64 {
    0.75
}

const fn default_hard_floor() -> f64 {
    0.50
}

const fn default_band_min() -> f64 {
    0.60
}

const fn default_band_max() -> f64 {
    0.90
}

const fn default_min_passing_samples() -> usize {
    5
}

const fn default_min_response_chars() -> usize {
    40
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
            hard_floor: default_hard_floor(),
            threshold_band_min: default_band_min(),
            threshold_band_max: default_band_max(),
            min_passing_samples: default_min_passing_samples(),
            min_response_chars: default_min_response_chars(),
            weights: CategoryWeights::default(),
        }
    }
}

impl QualityConfig {
    pub fn threshold_band(&self) -> ThresholdBand {
        ThresholdBand {
            min: self.threshold_band_min,
            max: self.threshold_band_max,
        }
    }

    /// Initial live parameter set derived from this configuration.
    pub fn initial_parameters(&self) -> QualityParameters {
        QualityParameters {
            weights: self.weights.clone(),
            default_threshold: self.default_threshold,
            hard_floor: self.hard_floor,
            threshold_band: self.threshold_band(),
            ..QualityParameters::default()
        }
    }
}

/// Refinement loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RefinementConfig {
    /// Maximum attempts per task (first draft included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Admission limit for concurrently running tasks
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Timeout of a single sub-agent call in milliseconds
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,

    /// Ask the prediction engine before spending a refinement attempt
    #[serde(default = "default_true")]
    pub prediction_short_circuit: bool,

    /// Refinement-success probability below which attempts are not spent
    #[serde(default = "default_min_success_probability")]
    pub min_success_probability: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_max_concurrent_tasks() -> usize {
    4
}

const fn default_invoke_timeout_ms() -> u64 {
    120_000
}

const fn default_min_success_probability() -> f64 {
    0.25
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
            prediction_short_circuit: default_true(),
            min_success_probability: default_min_success_probability(),
        }
    }
}

/// Prediction, anomaly and forecast configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PredictionConfig {
    /// Most recent records considered per subagent
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Records a model needs before it will predict
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    /// Neighbors used by the similarity model
    #[serde(default = "default_similarity_neighbors")]
    pub similarity_neighbors: usize,

    /// Confidence multiplier applied to the fallback prediction
    #[serde(default = "default_fallback_confidence_factor")]
    pub fallback_confidence_factor: f64,

    /// |z| above which a sample is anomalous
    #[serde(default = "default_anomaly_z_threshold")]
    pub anomaly_z_threshold: f64,

    /// Preceding samples forming the rolling window
    #[serde(default = "default_anomaly_window")]
    pub anomaly_window: usize,

    /// Minimum samples in the rolling window before scoring
    #[serde(default = "default_anomaly_min_window")]
    pub anomaly_min_window: usize,

    /// Floor applied to the rolling standard deviation of score streams
    #[serde(default = "default_min_stddev")]
    pub min_stddev: f64,

    /// Most recent scores used for the linear forecast
    #[serde(default = "default_forecast_window")]
    pub forecast_window: usize,

    /// Slope per sample separating improving/declining from stable
    #[serde(default = "default_trend_slope_threshold")]
    pub trend_slope_threshold: f64,

    /// Largest number of future samples a forecast may project
    #[serde(default = "default_max_forecast_horizon")]
    pub max_forecast_horizon: usize,
}

const fn default_history_window() -> usize {
    50
}

const fn default_min_history() -> usize {
    3
}

const fn default_similarity_neighbors() -> usize {
    5
}

const fn default_fallback_confidence_factor() -> f64 {
    0.8
}

const fn default_anomaly_z_threshold() -> f64 {
    2.5
}

const fn default_anomaly_window() -> usize {
    20
}

const fn default_anomaly_min_window() -> usize {
    5
}

const fn default_min_stddev() -> f64 {
    0.01
}

const fn default_forecast_window() -> usize {
    30
}

const fn default_trend_slope_threshold() -> f64 {
    0.01
}

const fn default_max_forecast_horizon() -> usize {
    100
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            min_history: default_min_history(),
            similarity_neighbors: default_similarity_neighbors(),
            fallback_confidence_factor: default_fallback_confidence_factor(),
            anomaly_z_threshold: default_anomaly_z_threshold(),
            anomaly_window: default_anomaly_window(),
            anomaly_min_window: default_anomaly_min_window(),
            min_stddev: default_min_stddev(),
            forecast_window: default_forecast_window(),
            trend_slope_threshold: default_trend_slope_threshold(),
            max_forecast_horizon: default_max_forecast_horizon(),
        }
    }
}

/// Auto-optimization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizationSettings {
    /// Most recent share of quality records used as the held-out set
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,

    /// Pass rate the replay objective steers towards
    #[serde(default = "default_target_pass_rate")]
    pub target_pass_rate: f64,

    /// Largest normalized weight any single category may carry
    #[serde(default = "default_max_weight_share")]
    pub max_weight_share: f64,

    /// Default iteration cap for background runs
    #[serde(default = "default_opt_max_iterations")]
    pub max_iterations: u32,

    /// Default wall-clock cap for background runs
    #[serde(default = "default_opt_max_duration_ms")]
    pub max_duration_ms: u64,

    /// Persist published parameters to the data directory
    #[serde(default = "default_true")]
    pub persist_parameters: bool,
}

const fn default_holdout_fraction() -> f64 {
    0.3
}

const fn default_target_pass_rate() -> f64 {
    0.85
}

const fn default_max_weight_share() -> f64 {
    0.6
}

const fn default_opt_max_iterations() -> u32 {
    50
}

const fn default_opt_max_duration_ms() -> u64 {
    30_000
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            holdout_fraction: default_holdout_fraction(),
            target_pass_rate: default_target_pass_rate(),
            max_weight_share: default_max_weight_share(),
            max_iterations: default_opt_max_iterations(),
            max_duration_ms: default_opt_max_duration_ms(),
            persist_parameters: default_true(),
        }
    }
}

/// A/B experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExperimentsConfig {
    /// Absolute Cohen's d at or above which an inconclusive, fully sampled
    /// experiment is flagged for redesign
    #[serde(default = "default_redesign_effect_size")]
    pub redesign_effect_size: f64,

    /// Observations kept per variant
    #[serde(default = "default_max_observations")]
    pub max_observations_per_variant: usize,
}

const fn default_redesign_effect_size() -> f64 {
    0.5
}

const fn default_max_observations() -> usize {
    10_000
}

impl Default for ExperimentsConfig {
    fn default() -> Self {
        Self {
            redesign_effect_size: default_redesign_effect_size(),
            max_observations_per_variant: default_max_observations(),
        }
    }
}

/// Background maintenance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MaintenanceConfig {
    /// Seconds between maintenance cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run a bounded optimization pass (with publish) every cycle
    #[serde(default)]
    pub optimize_on_cycle: bool,

    /// Stop the daemon after this many failed cycles in a row
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

const fn default_interval_secs() -> u64 {
    3600
}

const fn default_max_consecutive_failures() -> u32 {
    3
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            optimize_on_cycle: false,
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
