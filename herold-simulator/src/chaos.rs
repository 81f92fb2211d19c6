//! Chaos module.
//!
//! Fault-injecting delivery backend. Each send sleeps for the configured
//! latency plus uniform jitter (on the Tokio clock, so paused-time runs finish
//! instantly), then fails or is rejected with the configured probabilities.

use std::time::Duration;

use async_trait::async_trait;
use herold_engine::{DeliveryBackend, DeliveryError, DeliveryRequest};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::config::ChaosConfig;

/// What the backend decided for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Transport,
    Rejected,
}

#[derive(Debug)]
pub struct ChaosBackend {
    config: ChaosConfig,
    rng: Mutex<SmallRng>,
}

impl ChaosBackend {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Draws the delay and outcome of the next send.
    pub fn roll(&self) -> (Duration, Fault) {
        let mut rng = self.rng.lock();
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=self.config.jitter_ms)
        };
        let delay = Duration::from_millis(self.config.latency_ms + jitter);

        let roll: f64 = rng.random();
        let fault = if roll < self.config.rejection_rate {
            Fault::Rejected
        } else if roll < self.config.rejection_rate + self.config.failure_rate {
            Fault::Transport
        } else {
            Fault::None
        };
        (delay, fault)
    }
}

#[async_trait]
impl DeliveryBackend for ChaosBackend {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        let (delay, fault) = self.roll();
        tokio::time::sleep(delay).await;
        trace!(
            channel = %request.channel.name,
            attempt = request.attempt,
            ?fault,
            "Chaos send"
        );
        match fault {
            Fault::None => Ok(()),
            Fault::Transport => Err(DeliveryError::Transport("injected fault".into())),
            Fault::Rejected => Err(DeliveryError::Rejected("injected rejection".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chaos(failure_rate: f64, rejection_rate: f64) -> ChaosConfig {
        ChaosConfig {
            failure_rate,
            rejection_rate,
            latency_ms: 10,
            jitter_ms: 5,
        }
    }

    #[test]
    fn same_seed_same_rolls() {
        let a = ChaosBackend::new(chaos(0.3, 0.1), 42);
        let b = ChaosBackend::new(chaos(0.3, 0.1), 42);
        for _ in 0..100 {
            assert_eq!(a.roll(), b.roll());
        }
    }

    #[test]
    fn delay_stays_within_jitter_bound() {
        let backend = ChaosBackend::new(chaos(0.0, 0.0), 1);
        for _ in 0..1_000 {
            let (delay, fault) = backend.roll();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(15));
            assert_eq!(fault, Fault::None);
        }
    }

    #[test]
    fn failure_rate_is_roughly_honoured() {
        let backend = ChaosBackend::new(chaos(0.5, 0.0), 7);
        let failures = (0..10_000)
            .filter(|_| backend.roll().1 == Fault::Transport)
            .count();
        let rate = failures as f64 / 10_000.0;
        assert!((rate - 0.5).abs() < 0.05);
    }

    #[test]
    fn certain_rejection() {
        let backend = ChaosBackend::new(chaos(0.0, 1.0), 3);
        assert!((0..100).all(|_| backend.roll().1 == Fault::Rejected));
    }
}
