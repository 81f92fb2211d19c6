//! Per-channel admission control parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// What the limiter does with an alert once the bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceededAction {
    /// Discard the alert.
    Drop,
    /// Hold the alert in a bounded FIFO until tokens refill.
    Queue,
    /// Hand the alert to the emergency channel(s), bypassing their limiters.
    Escalate,
}

/// Token bucket configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_rate_limit))]
pub struct RateLimitConfig {
    #[serde(default)]
    pub is_enabled: bool,

    /// Sustained rate numerator: alerts per `time_window_ms`.
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_max_alerts")]
    pub max_alerts_per_window: u32,

    #[validate(range(min = 1, max = 3_600_000))]
    #[serde(default = "default_time_window")]
    pub time_window_ms: u64,

    /// Bucket size; the number of alerts admitted back to back.
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_burst")]
    pub burst_capacity: u32,

    #[serde(default = "default_action")]
    pub exceeded_action: ExceededAction,

    #[validate(range(min = 1, max = 1_000))]
    #[serde(default = "default_queue_size")]
    pub max_queue_size: usize,

    /// Longest an alert may wait in the queue (milliseconds).
    #[validate(range(min = 1))]
    #[serde(default = "default_queue_delay")]
    pub max_queue_delay_ms: u64,
}

fn default_max_alerts() -> u32 {
    60
}
fn default_time_window() -> u64 {
    60_000
}
fn default_burst() -> u32 {
    10
}
fn default_action() -> ExceededAction {
    ExceededAction::Drop
}
fn default_queue_size() -> usize {
    100
}
fn default_queue_delay() -> u64 {
    30_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            is_enabled: false,
            max_alerts_per_window: default_max_alerts(),
            time_window_ms: default_time_window(),
            burst_capacity: default_burst(),
            exceeded_action: default_action(),
            max_queue_size: default_queue_size(),
            max_queue_delay_ms: default_queue_delay(),
        }
    }
}

impl RateLimitConfig {
    /// An enabled limiter with the given sustained rate and burst.
    pub fn per_window(
        max_alerts: u32,
        window: Duration,
        burst: u32,
        action: ExceededAction,
    ) -> Self {
        Self {
            is_enabled: true,
            max_alerts_per_window: max_alerts,
            time_window_ms: window.as_millis() as u64,
            burst_capacity: burst,
            exceeded_action: action,
            ..Self::default()
        }
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }

    pub fn max_queue_delay(&self) -> Duration {
        Duration::from_millis(self.max_queue_delay_ms)
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.max_alerts_per_window as f64 / self.time_window().as_secs_f64()
    }
}
