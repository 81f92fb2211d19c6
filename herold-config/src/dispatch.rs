//! Engine-wide dispatch parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings shared by every channel worker of one engine.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Consecutive failures that mark a channel unhealthy.
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_failure_threshold")]
    pub health_failure_threshold: u32,

    /// Depth of each channel worker's command queue.
    #[validate(range(min = 1, max = 65_536))]
    #[serde(default = "default_command_capacity")]
    pub command_queue_capacity: usize,

    /// Capacity of the broadcast event channel.
    #[validate(range(min = 16, max = 65_536))]
    #[serde(default = "default_event_capacity")]
    pub event_buffer_capacity: usize,

    /// Seed for retry jitter. `None` seeds from the OS.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_command_capacity() -> usize {
    1_024
}
fn default_event_capacity() -> usize {
    1_024
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            health_failure_threshold: default_failure_threshold(),
            command_queue_capacity: default_command_capacity(),
            event_buffer_capacity: default_event_capacity(),
            rng_seed: None,
        }
    }
}

impl DispatchConfig {
    /// Deterministic variant used by tests and the simulator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.health_failure_threshold, 3);
        config.validate().expect("default dispatch config");
        assert_eq!(DispatchConfig::seeded(7).rng_seed, Some(7));
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = DispatchConfig {
            health_failure_threshold: 0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
