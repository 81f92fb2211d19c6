//! Seeded alert scenarios.
//!
//! A scenario is the full input of a run: the alerts, their offsets from the
//! start and the settings that produced them. Saving one to JSON and running
//! it again replays the exact same run.

use std::path::Path;

use herold_core::{Alert, Severity};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SimulatorConfig;
use crate::error::SimulationError;

const TAGS: [&str; 4] = ["database", "network", "storage", "application"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAlert {
    /// Virtual milliseconds since the start of the run.
    pub offset_ms: u64,
    pub id: String,
    pub severity: Severity,
    pub source: String,
    pub tag: String,
    pub message: String,
}

impl ScenarioAlert {
    pub fn to_alert(&self) -> Alert {
        let mut alert = Alert::new(self.message.clone(), self.severity, self.source.clone())
            .with_tag(self.tag.clone())
            .with_correlation_id(self.id.clone());
        alert.id = self.id.clone();
        alert
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub seed: u64,
    pub config: SimulatorConfig,
    pub alerts: Vec<ScenarioAlert>,
}

impl Scenario {
    /// Generates `config.alert_count` alerts from `config.seed`.
    pub fn generate(config: &SimulatorConfig) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.seed);
        let mut offset_ms = 0;
        let alerts = (0..config.alert_count)
            .map(|index| {
                // Gaps are uniform in [0, 2 * mean].
                offset_ms += rng.random_range(0..=config.mean_interval_ms.saturating_mul(2));
                let severity = pick_severity(&mut rng);
                let source = format!("service-{}", rng.random_range(0..config.source_count.max(1)));
                let tag = TAGS[rng.random_range(0..TAGS.len())].to_string();
                ScenarioAlert {
                    offset_ms,
                    id: format!("sim-{}-{index}", config.seed),
                    message: format!("{} {} alert #{index} from {source}", severity, tag),
                    severity,
                    source,
                    tag,
                }
            })
            .collect();
        Self {
            seed: config.seed,
            config: config.clone(),
            alerts,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SimulationError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SimulationError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Virtual time of the last alert.
    pub fn duration_ms(&self) -> u64 {
        self.alerts.last().map_or(0, |a| a.offset_ms)
    }
}

/// Skewed towards the low end, like real alert traffic.
fn pick_severity(rng: &mut SmallRng) -> Severity {
    match rng.random_range(0..100) {
        0..=24 => Severity::Info,
        25..=54 => Severity::Warning,
        55..=79 => Severity::Error,
        80..=94 => Severity::Critical,
        95..=97 => Severity::Emergency,
        _ => Severity::Debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulatorConfig {
        SimulatorConfig {
            seed,
            alert_count: 50,
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(Scenario::generate(&config(5)), Scenario::generate(&config(5)));
        assert_ne!(Scenario::generate(&config(5)), Scenario::generate(&config(6)));
    }

    #[test]
    fn offsets_are_monotonic_and_ids_unique() {
        let scenario = Scenario::generate(&config(11));
        assert_eq!(scenario.alerts.len(), 50);
        assert!(scenario.alerts.windows(2).all(|w| w[0].offset_ms <= w[1].offset_ms));
        let mut ids: Vec<_> = scenario.alerts.iter().map(|a| a.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn alerts_keep_scenario_ids() {
        let scenario = Scenario::generate(&config(1));
        let alert = scenario.alerts[0].to_alert();
        assert_eq!(alert.id, "sim-1-0");
        assert_eq!(alert.correlation_id, "sim-1-0");
        assert_eq!(alert.normalized().id, "sim-1-0");
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join(format!("herold-scenario-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scenario.json");
        let scenario = Scenario::generate(&config(3));
        scenario.save(&path).unwrap();
        assert_eq!(Scenario::load(&path).unwrap(), scenario);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
