use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::LoggingConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_format")]
    pub format: LogFormat,

    /// Directory for log files (optional, if None logs only to stderr)
    pub log_dir: Option<PathBuf>,

    /// Enable console logging
    #[serde(default = "default_true")]
    pub enable_console: bool,

    /// Log rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown names fall back to JSON; the config loader rejects them first.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: LogFormat::from_name(&config.format),
            log_dir: config.log_dir.as_ref().map(PathBuf::from),
            ..Self::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_format() -> LogFormat {
    LogFormat::Json
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logging_config() {
        let settings = LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
            log_dir: Some("/tmp/overseer-logs".to_string()),
        };
        let config = LogConfig::from(&settings);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/overseer-logs")));
        assert_eq!(config.rotation, RotationPolicy::Daily);
    }

    #[test]
    fn test_unknown_format_is_json() {
        assert_eq!(LogFormat::from_name("xml"), LogFormat::Json);
        assert_eq!(LogFormat::from_name("PRETTY"), LogFormat::Pretty);
    }
}
