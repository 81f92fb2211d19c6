//! Simulation parameters.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::SimulationError;

/// Fault injection applied by [`crate::chaos::ChaosBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChaosConfig {
    /// Probability that a send fails with a retryable transport error.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default)]
    pub failure_rate: f64,

    /// Probability that a send is rejected outright.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default)]
    pub rejection_rate: f64,

    /// Fixed latency added to every send.
    #[serde(default = "default_latency")]
    pub latency_ms: u64,

    /// Upper bound of the uniform jitter added on top of `latency_ms`.
    #[serde(default)]
    pub jitter_ms: u64,
}

fn default_latency() -> u64 {
    20
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            rejection_rate: 0.0,
            latency_ms: default_latency(),
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub seed: u64,

    /// Alerts generated per scenario.
    #[validate(range(min = 1, max = 1_000_000))]
    #[serde(default = "default_alert_count")]
    pub alert_count: usize,

    /// Mean gap between generated alerts.
    #[validate(range(min = 1))]
    #[serde(default = "default_mean_interval")]
    pub mean_interval_ms: u64,

    /// Distinct alert sources drawn from.
    #[validate(range(min = 1, max = 1_000))]
    #[serde(default = "default_sources")]
    pub source_count: usize,

    #[validate(nested)]
    #[serde(default)]
    pub chaos: ChaosConfig,
}

fn default_alert_count() -> usize {
    100
}
fn default_mean_interval() -> u64 {
    250
}
fn default_sources() -> usize {
    8
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            alert_count: default_alert_count(),
            mean_interval_ms: default_mean_interval(),
            source_count: default_sources(),
            chaos: ChaosConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Loads `path` over the defaults; `HEROLD_SIM_*` variables override both.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SimulationError::FileNotFound(PathBuf::from(path)));
        }
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("HEROLD_SIM_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}
