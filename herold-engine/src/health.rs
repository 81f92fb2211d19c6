//! Channel health tracking and the system-wide rollup.
//!
//! A channel turns unhealthy once `consecutive_failures` reaches the
//! threshold and healthy again on the next success. The rollup ratio is
//! `healthy / total`; a system event accompanies every change of it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use herold_core::events::{health_ratio, AlertSystemHealthChanged, ChannelHealthChanged};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelHealthState {
    pub is_healthy: bool,
    pub last_check_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_failure_reason: Option<String>,
}

impl Default for ChannelHealthState {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_check_time: None,
            consecutive_failures: 0,
            last_failure_reason: None,
        }
    }
}

/// Events produced by one health update.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HealthUpdate {
    pub channel: Option<ChannelHealthChanged>,
    pub system: Option<AlertSystemHealthChanged>,
}

impl HealthUpdate {
    pub fn is_empty(&self) -> bool {
        self.channel.is_none() && self.system.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub ratio: f64,
    pub healthy_channels: usize,
    pub total_channels: usize,
    pub channels: BTreeMap<String, ChannelHealthState>,
}

#[derive(Debug)]
pub struct ChannelHealthTracker {
    threshold: u32,
    channels: BTreeMap<String, ChannelHealthState>,
    started: Instant,
    ratio: f64,
}

impl ChannelHealthTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            threshold: failure_threshold.max(1),
            channels: BTreeMap::new(),
            started: Instant::now(),
            ratio: 1.0,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.threshold
    }

    /// Starts tracking `channel` as healthy.
    pub fn register(
        &mut self,
        channel: &str,
        active_alerts: usize,
    ) -> Option<AlertSystemHealthChanged> {
        self.channels.insert(channel.to_string(), ChannelHealthState::default());
        self.rollup(active_alerts)
    }

    pub fn unregister(
        &mut self,
        channel: &str,
        active_alerts: usize,
    ) -> Option<AlertSystemHealthChanged> {
        self.channels.remove(channel)?;
        self.rollup(active_alerts)
    }

    /// Records the outcome of one delivery attempt. Unknown channels are ignored.
    pub fn record_result(
        &mut self,
        channel: &str,
        success: bool,
        reason: Option<&str>,
        active_alerts: usize,
    ) -> HealthUpdate {
        let threshold = self.threshold;
        let Some(state) = self.channels.get_mut(channel) else {
            return HealthUpdate::default();
        };

        let previous = state.is_healthy;
        state.last_check_time = Some(Utc::now());
        if success {
            state.consecutive_failures = 0;
            state.is_healthy = true;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_failure_reason = reason.map(str::to_string);
            if state.consecutive_failures >= threshold {
                state.is_healthy = false;
            }
        }

        if previous == state.is_healthy {
            return HealthUpdate::default();
        }
        let changed = ChannelHealthChanged::new(
            channel,
            previous,
            state.is_healthy,
            state.consecutive_failures,
            if success { None } else { reason },
        );
        HealthUpdate {
            channel: Some(changed),
            system: self.rollup(active_alerts),
        }
    }

    pub fn state(&self, channel: &str) -> Option<&ChannelHealthState> {
        self.channels.get(channel)
    }

    pub fn is_healthy(&self, channel: &str) -> Option<bool> {
        self.channels.get(channel).map(|s| s.is_healthy)
    }

    pub fn healthy_count(&self) -> usize {
        self.channels.values().filter(|s| s.is_healthy).count()
    }

    pub fn system_ratio(&self) -> f64 {
        health_ratio(self.healthy_count(), self.channels.len())
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            ratio: self.system_ratio(),
            healthy_channels: self.healthy_count(),
            total_channels: self.channels.len(),
            channels: self.channels.clone(),
        }
    }

    fn rollup(&mut self, active_alerts: usize) -> Option<AlertSystemHealthChanged> {
        let healthy = self.healthy_count();
        let total = self.channels.len();
        let ratio = health_ratio(healthy, total);
        if (ratio - self.ratio).abs() < f64::EPSILON {
            return None;
        }
        let previous = std::mem::replace(&mut self.ratio, ratio);
        Some(AlertSystemHealthChanged::new(
            previous,
            healthy,
            total,
            active_alerts,
            self.started.elapsed(),
        ))
    }
}
