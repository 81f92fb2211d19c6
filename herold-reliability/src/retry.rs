//! ## herold-reliability::retry
//! **Exponential backoff with multiplicative jitter**
//!
//! `attempt` always counts delivery attempts already made, so `attempt = 1`
//! means the first send failed and asks for the delay before the second.
//! The delay is `min(base * multiplier^(attempt - 1), max)`. With jitter the
//! value is scaled by a uniform factor in `[1 - p, 1 + p]` and clamped to
//! `[0, max]` afterwards.

use std::time::Duration;

use herold_config::RetryPolicyConfig;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryPolicyConfig {
        &self.config
    }

    /// Total attempts a delivery gets, counting the first one.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Whether another attempt follows after `attempts_made` failures.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.config.max_attempts
    }

    /// Backoff delay without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        millis(self.base_delay_ms(attempt))
    }

    /// Delay before the attempt following `attempt`, jittered when enabled.
    pub fn compute_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay_ms(attempt);
        let spread = self.config.jitter_max_percentage;
        if !self.config.jitter_enabled || spread <= 0.0 {
            return millis(base);
        }
        let factor = rng.random_range((1.0 - spread)..=(1.0 + spread));
        millis((base * factor).clamp(0.0, self.config.max_delay_ms as f64))
    }

    fn base_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.max(1).saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.config.base_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        let max = self.config.max_delay_ms as f64;
        if raw.is_finite() {
            raw.min(max)
        } else {
            max
        }
    }
}

impl From<RetryPolicyConfig> for RetryPolicy {
    fn from(config: RetryPolicyConfig) -> Self {
        Self::new(config)
    }
}

fn millis(ms: f64) -> Duration {
    Duration::from_micros((ms * 1_000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn policy(
        max_attempts: u32,
        base_ms: u64,
        max_ms: u64,
        multiplier: f64,
        jitter: f64,
    ) -> RetryPolicy {
        RetryPolicy::new(RetryPolicyConfig {
            max_attempts,
            base_delay_ms: base_ms,
            max_delay_ms: max_ms,
            backoff_multiplier: multiplier,
            jitter_enabled: jitter > 0.0,
            jitter_max_percentage: jitter,
        })
    }

    #[test]
    fn doubles_until_capped() {
        let policy = policy(10, 100, 1_000, 2.0, 0.0);
        let mut rng = SmallRng::seed_from_u64(1);
        let delays: Vec<u64> = (1..=6)
            .map(|n| policy.compute_delay(n, &mut rng).as_millis() as u64)
            .collect();
        assert_eq!(delays, [100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn attempt_zero_behaves_like_first() {
        let policy = policy(3, 250, 1_000, 3.0, 0.0);
        assert_eq!(policy.base_delay(0), policy.base_delay(1));
    }

    #[test]
    fn should_retry_counts_total_attempts() {
        let policy = policy(3, 100, 1_000, 2.0, 0.0);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.max_attempts(), 3);

        let never = RetryPolicy::new(RetryPolicyConfig::disabled());
        assert!(!never.should_retry(1));
        assert_eq!(never.max_attempts(), 1);
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let policy = policy(5, 1_000, 30_000, 2.0, 0.5);
        let a: Vec<_> = {
            let mut rng = SmallRng::seed_from_u64(99);
            (1..5).map(|n| policy.compute_delay(n, &mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = SmallRng::seed_from_u64(99);
            (1..5).map(|n| policy.compute_delay(n, &mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn huge_exponent_saturates_at_max() {
        let policy = policy(10, 3_600_000, 7_200_000, 10.0, 0.0);
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(7_200_000));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_bounded(
            base in 1u64..10_000,
            extra in 0u64..100_000,
            multiplier in 1.0f64..10.0,
            max_attempts in 1u32..=10,
        ) {
            let policy = policy(max_attempts, base, base + extra, multiplier, 0.0);
            let max = Duration::from_millis(base + extra);
            for n in 1..max_attempts {
                prop_assert!(policy.base_delay(n + 1) >= policy.base_delay(n));
                prop_assert!(policy.base_delay(n) <= max);
            }
        }

        #[test]
        fn jitter_stays_within_bounds(
            base in 1u64..10_000,
            extra in 0u64..100_000,
            multiplier in 1.0f64..10.0,
            spread in 0.01f64..=0.5,
            attempt in 1u32..=10,
            seed in any::<u64>(),
        ) {
            let policy = policy(10, base, base + extra, multiplier, spread);
            let mut rng = SmallRng::seed_from_u64(seed);
            let unjittered = policy.base_delay(attempt).as_secs_f64();
            let max = (base + extra) as f64 / 1_000.0;
            let delay = policy.compute_delay(attempt, &mut rng).as_secs_f64();
            let tolerance = 2e-6;
            prop_assert!(delay >= unjittered * (1.0 - spread) - tolerance);
            prop_assert!(delay <= max.min(unjittered * (1.0 + spread)) + tolerance);
        }
    }
}
