use std::time::Duration;

use serde::Serialize;

use super::{EventHeader, MessagePriority};

/// System-wide rollup of channel health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertSystemHealthChanged {
    pub header: EventHeader,
    pub previous_ratio: f64,
    pub current_ratio: f64,
    pub healthy_channels: usize,
    pub total_channels: usize,
    pub active_alert_count: usize,
    pub uptime: Duration,
}

impl AlertSystemHealthChanged {
    pub fn new(
        previous_ratio: f64,
        healthy_channels: usize,
        total_channels: usize,
        active_alert_count: usize,
        uptime: Duration,
    ) -> Self {
        let current_ratio = health_ratio(healthy_channels, total_channels);
        let priority = if current_ratio < previous_ratio {
            MessagePriority::High
        } else {
            MessagePriority::Normal
        };
        Self {
            header: EventHeader::new(priority, ""),
            previous_ratio,
            current_ratio,
            healthy_channels,
            total_channels,
            active_alert_count,
            uptime,
        }
    }
}

/// `healthy / total`; an empty system counts as fully healthy.
pub fn health_ratio(healthy: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        healthy as f64 / total as f64
    }
}
