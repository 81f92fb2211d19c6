/*!
# Herold Simulator

Deterministic load and failure runs for the dispatch engine.

A seeded [`Scenario`] of alerts is replayed against a real
[`AlertDispatchEngine`] whose channels are all served by a fault-injecting
[`ChaosBackend`]. The run happens on a paused current-thread Tokio runtime, so
batch intervals, backoff delays and rate-limit refills take no wall time and
every run of the same scenario produces the same outcome.

## Key Components:
- **Scenario:** seeded alert generator, saved and replayed as JSON.
- **Chaos Backend:** latency, jitter, transport failures and rejections.
- **Report:** per-channel statistics plus a BLAKE3 digest over every outcome event.
*/

use std::sync::Arc;
use std::time::Duration;

use blake3::Hasher;
use herold_config::{ChannelConfig, ConfigError, HeroldConfig};
use herold_core::events::AlertEvent;
use herold_core::ChannelType;
use herold_engine::{AlertDispatchEngine, BackendRegistry, ChannelStatisticsSnapshot, MemorySink};
use herold_telemetry::MetricsRecorder;
use serde::Serialize;
use tokio::time::{sleep_until, Instant};
use tracing::{info, instrument};

pub mod chaos;
pub mod config;
pub mod error;
pub mod scenario;

pub use chaos::{ChaosBackend, Fault};
pub use config::{ChaosConfig, SimulatorConfig};
pub use error::SimulationError;
pub use scenario::{Scenario, ScenarioAlert};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelOutcome {
    pub name: String,
    pub healthy: bool,
    pub statistics: ChannelStatisticsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub alerts: usize,
    /// Alert/channel pairs delivered.
    pub delivered: usize,
    /// Alert/channel pairs that failed for good.
    pub failed: usize,
    /// Failed attempts that were retried.
    pub retried: usize,
    pub suppressed: usize,
    pub filtered: usize,
    pub virtual_duration_ms: u64,
    pub health_ratio: f64,
    pub channels: Vec<ChannelOutcome>,
    /// Hex BLAKE3 digest of the outcome events.
    pub digest: String,
}

impl SimulationReport {
    pub fn verify(&self, expected: &str) -> Result<(), SimulationError> {
        if self.digest.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(SimulationError::DigestMismatch {
                expected: expected.to_string(),
                actual: self.digest.clone(),
            })
        }
    }
}

pub struct Simulator {
    herold: HeroldConfig,
}

impl Simulator {
    /// Simulates the channels of `herold`, or [`Simulator::default_channels`]
    /// when it declares none.
    pub fn new(mut herold: HeroldConfig) -> Result<Self, SimulationError> {
        if herold.channels.is_empty() {
            herold.channels = Self::default_channels()?;
        }
        Ok(Self { herold })
    }

    /// A log, webhook, email and pager channel covering every limiter action.
    pub fn default_channels() -> Result<Vec<ChannelConfig>, ConfigError> {
        Ok(vec![
            ChannelConfig::create_log_channel("audit-log")?,
            ChannelConfig::create_network_channel(
                "ops-webhook",
                "https://hooks.example.com/herold",
            )?,
            ChannelConfig::create_email_channel("oncall-email", "oncall@example.com")?,
            ChannelConfig::create_emergency_channel("pager", ChannelType::Custom)?,
        ])
    }

    pub fn channels(&self) -> &[ChannelConfig] {
        &self.herold.channels
    }

    /// Runs `scenario` on a fresh paused runtime.
    pub fn run_blocking(&self, scenario: &Scenario) -> Result<SimulationReport, SimulationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()?;
        runtime.block_on(self.run(scenario))
    }

    /// Runs `scenario` on the current runtime. Deterministic only when that
    /// runtime is single-threaded with paused time.
    #[instrument(
        name = "simulation",
        skip_all,
        fields(seed = scenario.seed, alerts = scenario.alerts.len())
    )]
    pub async fn run(&self, scenario: &Scenario) -> Result<SimulationReport, SimulationError> {
        let sink = Arc::new(MemorySink::new());
        let metrics = MetricsRecorder::new("herold_sim")
            .map_err(|e| SimulationError::Metrics(e.to_string()))?;
        let mut dispatch = self.herold.dispatch.clone();
        dispatch.rng_seed = Some(scenario.seed);

        let engine = AlertDispatchEngine::new(
            dispatch,
            BackendRegistry::new(),
            sink.clone(),
            Arc::new(metrics),
        );
        for channel in &self.herold.channels {
            let seed = channel_seed(scenario.seed, &channel.name);
            let backend = ChaosBackend::new(scenario.config.chaos.clone(), seed);
            engine.register_channel_with_backend(channel.clone(), Arc::new(backend))?;
        }

        let start = Instant::now();
        let mut filtered = 0;
        for alert in &scenario.alerts {
            sleep_until(start + Duration::from_millis(alert.offset_ms)).await;
            filtered += engine.dispatch(alert.to_alert()).await?.filtered.len();
        }
        engine.wait_idle().await;
        let elapsed = start.elapsed();

        let health = engine.health_snapshot();
        let channels = engine
            .channel_names()
            .into_iter()
            .filter_map(|name| {
                let statistics = engine.channel_statistics(&name)?;
                let healthy = health.channels.get(&name).map_or(true, |state| state.is_healthy);
                Some(ChannelOutcome {
                    name,
                    healthy,
                    statistics,
                })
            })
            .collect();
        engine.shutdown().await;

        let events = sink.take();
        let mut report = SimulationReport {
            seed: scenario.seed,
            alerts: scenario.alerts.len(),
            delivered: 0,
            failed: 0,
            retried: 0,
            suppressed: 0,
            filtered,
            virtual_duration_ms: elapsed.as_millis() as u64,
            health_ratio: health.ratio,
            channels,
            digest: String::new(),
        };
        for event in &events {
            match event {
                AlertEvent::AlertDelivered(_) => report.delivered += 1,
                AlertEvent::AlertDeliveryFailed(e) if e.is_final_failure => report.failed += 1,
                AlertEvent::AlertDeliveryFailed(_) => report.retried += 1,
                AlertEvent::AlertSuppressed(_) => report.suppressed += 1,
                _ => {}
            }
        }
        report.digest = outcome_digest(&events, report.virtual_duration_ms);

        info!(
            delivered = report.delivered,
            failed = report.failed,
            suppressed = report.suppressed,
            digest = %report.digest,
            "Simulation complete"
        );
        Ok(report)
    }
}

fn channel_seed(seed: u64, channel: &str) -> u64 {
    let hash = blake3::hash(channel.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    seed ^ u64::from_le_bytes(bytes)
}

/// Digest over the outcome events, grouped by channel in publication order.
/// Event ids and wall-clock timestamps are left out.
fn outcome_digest(events: &[AlertEvent], virtual_duration_ms: u64) -> String {
    let mut lines: Vec<(String, String)> = events
        .iter()
        .filter_map(|event| match event {
            AlertEvent::AlertDelivered(e) => Some((
                e.channel.clone(),
                format!("delivered|{}|{}|{}", e.alert_id, e.attempts, e.batch_size),
            )),
            AlertEvent::AlertDeliveryFailed(e) => Some((
                e.channel.clone(),
                format!(
                    "failed|{}|{}|{}|{}",
                    e.alert_id, e.error_type, e.retry_count, e.is_final_failure
                ),
            )),
            AlertEvent::AlertSuppressed(e) => Some((
                e.channel.clone(),
                format!("suppressed|{}|{:?}", e.alert_id, e.reason),
            )),
            AlertEvent::ChannelHealthChanged(e) => Some((
                e.channel.clone(),
                format!("health|{}|{}", e.current_healthy, e.consecutive_failures),
            )),
            _ => None,
        })
        .collect();
    lines.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Hasher::new();
    for (channel, line) in &lines {
        hasher.update(channel.as_bytes());
        hasher.update(b"|");
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(format!("elapsed|{virtual_duration_ms}").as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(seed: u64, failure_rate: f64) -> Scenario {
        Scenario::generate(&SimulatorConfig {
            seed,
            alert_count: 60,
            chaos: ChaosConfig {
                failure_rate,
                rejection_rate: 0.0,
                latency_ms: 10,
                jitter_ms: 20,
            },
            ..SimulatorConfig::default()
        })
    }

    #[test]
    fn same_scenario_same_digest() {
        let simulator = Simulator::new(HeroldConfig::default()).unwrap();
        let scenario = scenario(42, 0.3);
        let first = simulator.run_blocking(&scenario).unwrap();
        let second = simulator.run_blocking(&scenario).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first, second);
        first.verify(&second.digest.to_uppercase()).unwrap();
    }

    #[test]
    fn different_seed_different_digest() {
        let simulator = Simulator::new(HeroldConfig::default()).unwrap();
        let a = simulator.run_blocking(&scenario(1, 0.3)).unwrap();
        let b = simulator.run_blocking(&scenario(2, 0.3)).unwrap();
        assert_ne!(a.digest, b.digest);
        assert!(matches!(a.verify(&b.digest), Err(SimulationError::DigestMismatch { .. })));
    }

    #[test]
    fn fault_free_run_delivers_everything_routed() {
        let simulator = Simulator::new(HeroldConfig::default()).unwrap();
        let report = simulator.run_blocking(&scenario(7, 0.0)).unwrap();
        assert_eq!(report.failed, 0);
        assert_eq!(report.retried, 0);
        assert_eq!(report.health_ratio, 1.0);
        assert!(report.delivered > 0);
        for channel in &report.channels {
            assert_eq!(channel.statistics.evaluated, report.alerts as u64);
        }
    }

    #[test]
    fn constant_failure_exhausts_retries() {
        let simulator = Simulator::new(HeroldConfig::default()).unwrap();
        let report = simulator.run_blocking(&scenario(9, 1.0)).unwrap();
        assert_eq!(report.delivered, 0);
        assert!(report.failed > 0);
        assert!(report.retried > 0);
        assert!(report.channels.iter().any(|c| !c.healthy));
    }
}
