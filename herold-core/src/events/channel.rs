//! Channel registry, health and filter events.

use serde::Serialize;

use super::{EventHeader, MessagePriority};
use crate::channel::ChannelType;
use crate::severity::Severity;
use crate::text::{truncate_bytes, truncate_owned, MAX_MESSAGE_BYTES, MAX_NAME_BYTES};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ChannelRegistered {
    pub header: EventHeader,
    pub channel: String,
    pub channel_type: ChannelType,
    pub priority: u32,
    pub is_emergency_channel: bool,
}

impl ChannelRegistered {
    pub fn new(
        channel: &str,
        channel_type: ChannelType,
        priority: u32,
        is_emergency: bool,
    ) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Normal, ""),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            channel_type,
            priority,
            is_emergency_channel: is_emergency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ChannelUnregistered {
    pub header: EventHeader,
    pub channel: String,
    /// Alerts that were queued, batched or awaiting retry and got discarded.
    pub discarded_alerts: usize,
}

impl ChannelUnregistered {
    pub fn new(channel: &str, discarded_alerts: usize) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Normal, ""),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            discarded_alerts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ChannelHealthChanged {
    pub header: EventHeader,
    pub channel: String,
    pub previous_healthy: bool,
    pub current_healthy: bool,
    pub consecutive_failures: u32,
    pub reason: Option<String>,
}

impl ChannelHealthChanged {
    pub fn new(
        channel: &str,
        previous_healthy: bool,
        current_healthy: bool,
        consecutive_failures: u32,
        reason: Option<&str>,
    ) -> Self {
        let priority = if current_healthy {
            MessagePriority::Normal
        } else {
            MessagePriority::High
        };
        Self {
            header: EventHeader::new(priority, ""),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            previous_healthy,
            current_healthy,
            consecutive_failures,
            reason: reason.map(|r| truncate_bytes(r, MAX_MESSAGE_BYTES)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ChannelConfigurationChanged {
    pub header: EventHeader,
    pub channel: String,
    /// Names of the top-level settings that differ between old and new config.
    pub changed_fields: Vec<String>,
}

impl ChannelConfigurationChanged {
    pub fn new(channel: &str, changed_fields: Vec<String>) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Normal, ""),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            changed_fields: changed_fields
                .into_iter()
                .map(|f| truncate_owned(f, MAX_NAME_BYTES))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct FilterConfigurationChanged {
    pub header: EventHeader,
    pub channel: String,
    pub is_enabled: bool,
    pub minimum_severity: Severity,
    pub maximum_severity: Severity,
    pub allowed_tag_count: usize,
    pub ignored_source_count: usize,
}

impl FilterConfigurationChanged {
    pub fn new(
        channel: &str,
        is_enabled: bool,
        minimum_severity: Severity,
        maximum_severity: Severity,
        allowed_tag_count: usize,
        ignored_source_count: usize,
    ) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Low, ""),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            is_enabled,
            minimum_severity,
            maximum_severity,
            allowed_tag_count,
            ignored_source_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct FilterStatisticsUpdated {
    pub header: EventHeader,
    pub channel: String,
    pub evaluated: u64,
    pub passed: u64,
    pub filtered: u64,
    pub rate_limited: u64,
    /// `passed / evaluated`, or 0 when nothing was evaluated.
    pub pass_rate: f64,
}

impl FilterStatisticsUpdated {
    pub fn new(
        channel: &str,
        evaluated: u64,
        passed: u64,
        filtered: u64,
        rate_limited: u64,
    ) -> Self {
        let pass_rate = if evaluated == 0 {
            0.0
        } else {
            passed as f64 / evaluated as f64
        };
        Self {
            header: EventHeader::new(MessagePriority::Low, ""),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            evaluated,
            passed,
            filtered,
            rate_limited,
            pass_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_rate_handles_empty_statistics() {
        assert_eq!(FilterStatisticsUpdated::new("log", 0, 0, 0, 0).pass_rate, 0.0);
        assert_eq!(FilterStatisticsUpdated::new("log", 4, 3, 1, 0).pass_rate, 0.75);
    }

    #[test]
    fn unhealthy_transitions_are_high_priority() {
        let event = ChannelHealthChanged::new("pager", true, false, 3, Some("timeout"));
        assert_eq!(event.header.priority, MessagePriority::High);
    }
}
