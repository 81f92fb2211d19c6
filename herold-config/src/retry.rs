//! Retry policy parameters for failed deliveries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Exponential backoff with optional multiplicative jitter.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_retry_policy))]
pub struct RetryPolicyConfig {
    /// Total delivery attempts per alert. 0 and 1 both mean "never retry".
    #[validate(range(max = 10))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds).
    #[validate(range(min = 1, max = 3_600_000))]
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds).
    #[validate(range(min = 1, max = 7_200_000))]
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[validate(range(min = 1.0, max = 10.0))]
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter_enabled: bool,

    /// Jitter spread as a fraction of the delay.
    #[validate(range(min = 0.0, max = 0.5))]
    #[serde(default = "default_jitter")]
    pub jitter_max_percentage: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1_000
}
fn default_max_delay() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
            jitter_enabled: default_true(),
            jitter_max_percentage: default_jitter(),
        }
    }
}

impl RetryPolicyConfig {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Policy used by network and email channels, where transient failures are common.
    pub fn network() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            ..Self::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
