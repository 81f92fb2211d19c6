//! # Herold Configuration System
//!
//! Hierarchical configuration for the alert dispatch engine.
//!
//! ## Features
//! - **Channel policies**: severity windows, batching, retry and rate limits per channel
//! - **Validation**: every range and cross-field invariant checked before a channel goes live
//! - **Environment Awareness**: YAML files layered with `HEROLD_*` overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod channel;
mod dispatch;
mod error;
mod rate_limit;
mod retry;
mod telemetry;
pub mod validation;

pub use channel::{
    ChannelConfig, ChannelConfigBuilder, DEFAULT_JSON_MESSAGE_FORMAT, DEFAULT_MESSAGE_FORMAT,
    DEFAULT_TIMESTAMP_FORMAT,
};
pub use dispatch::DispatchConfig;
pub use error::ConfigError;
pub use rate_limit::{ExceededAction, RateLimitConfig};
pub use retry::RetryPolicyConfig;
pub use telemetry::{MetricsConfig, TelemetryConfig};

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct HeroldConfig {
    /// Engine-wide dispatch parameters.
    #[validate(nested)]
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging and metrics.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Channels registered at startup.
    #[validate(nested)]
    #[validate(custom(function = validation::validate_unique_names))]
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl HeroldConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/herold.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment-specific overrides (`HEROLD_ENV`).
    /// 4. `HEROLD_*` environment variables, nested with `__`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(HeroldConfig::default()));

        if Path::new("config/herold.yaml").exists() {
            figment = figment.merge(Yaml::file("config/herold.yaml"));
        }

        let env = std::env::var("HEROLD_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment.merge(Env::prefixed("HEROLD_").split("__")))
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(HeroldConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed("HEROLD_").split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Channels in dispatch order (ascending priority, then name).
    pub fn channels_in_dispatch_order(&self) -> Vec<&ChannelConfig> {
        let mut channels: Vec<_> = self.channels.iter().collect();
        channels.sort_by(|a, b| a.dispatch_order(b));
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use herold_core::{ChannelType, Severity};

    const SAMPLE: &str = r#"
dispatch:
  health_failure_threshold: 4
channels:
  - name: ops-log
    channel_type: log
    priority: 50
  - name: pager
    channel_type: custom
    minimum_severity: critical
    is_emergency_channel: true
    priority: 1
  - name: hook
    channel_type: network
    minimum_severity: error
    settings:
      endpoint: https://hooks.example.com/herold
    rate_limit:
      is_enabled: true
      max_alerts_per_window: 2
      time_window_ms: 1000
      burst_capacity: 2
      exceeded_action: escalate
"#;

    fn to_figment_error(error: ConfigError) -> figment::Error {
        figment::Error::from(error.to_string())
    }

    #[test]
    fn full_config_validation() {
        let config = HeroldConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn loads_layered_files_and_environment() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file("config/herold.yaml", SAMPLE)?;
            jail.create_file("config/staging.yaml", "telemetry:\n  log_level: debug\n")?;
            jail.set_env("HEROLD_ENV", "staging");
            jail.set_env("HEROLD_DISPATCH__RNG_SEED", "42");

            let config = HeroldConfig::load().map_err(to_figment_error)?;
            assert_eq!(config.dispatch.health_failure_threshold, 4);
            assert_eq!(config.dispatch.rng_seed, Some(42));
            assert_eq!(config.telemetry.log_level, "debug");
            assert_eq!(config.channels.len(), 3);

            let hook = &config.channels[2];
            assert_eq!(hook.channel_type, ChannelType::Network);
            assert_eq!(hook.minimum_severity, Severity::Error);
            assert_eq!(hook.rate_limit.exceeded_action, ExceededAction::Escalate);

            let order: Vec<_> = config
                .channels_in_dispatch_order()
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            assert_eq!(order, ["pager", "ops-log", "hook"]);
            Ok(())
        });
    }

    #[test]
    fn rejects_duplicate_channel_names() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "dupes.yaml",
                "channels:\n  - name: a\n    channel_type: log\n  - name: a\n    channel_type: console\n",
            )?;
            let result = HeroldConfig::load_from_path("dupes.yaml");
            assert!(matches!(result, Err(ConfigError::Validation(_))));
            Ok(())
        });
    }

    #[test]
    fn reports_nested_channel_errors() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bad.yaml",
                "channels:\n  - name: hook\n    channel_type: network\n    batch_size: 0\n",
            )?;
            let error = HeroldConfig::load_from_path("bad.yaml").unwrap_err();
            assert!(error.to_string().contains("channels[0].batch_size"));
            Ok(())
        });
    }

    #[test]
    fn missing_file() {
        let result = HeroldConfig::load_from_path("does/not/exist.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
