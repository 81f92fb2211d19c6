//! Observability configuration.
//!
//! Parameters for the log subscriber and the prometheus registry.

use serde::{Deserialize, Serialize};
use validator::{self, Validate, ValidationError};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level")
            .with_message("log level must be one of trace, debug, info, warn, error".into()))
    }
}

/// Metrics collection parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prefix applied to every metric name.
    #[validate(length(min = 1, max = 32))]
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Fallback level when `RUST_LOG` is unset.
    #[validate(custom(function = validate_log_level))]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log each published alert event at info level.
    #[serde(default = "default_true")]
    pub log_events: bool,

    #[validate(nested)]
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_true() -> bool {
    true
}
fn default_namespace() -> String {
    "herold".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: default_namespace(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_events: true,
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_is_checked() {
        let mut config = TelemetryConfig::default();
        config.validate().expect("default telemetry");
        config.log_level = "WARN".into();
        assert!(config.validate().is_ok());
        config.log_level = "loud".into();
        assert!(config.validate().is_err());
    }
}
