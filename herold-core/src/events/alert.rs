//! Alert lifecycle and delivery outcome events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventHeader, MessagePriority};
use crate::alert::Alert;
use crate::severity::Severity;
use crate::text::{
    truncate_bytes, truncate_owned, MAX_IDENTIFIER_BYTES, MAX_MESSAGE_BYTES, MAX_NAME_BYTES,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertRaised {
    pub header: EventHeader,
    pub alert_id: String,
    pub severity: Severity,
    pub source: String,
    pub tag: String,
    pub message: String,
    pub count: u32,
}

impl AlertRaised {
    pub fn new(alert: &Alert) -> Self {
        Self {
            header: EventHeader::new(alert.severity.into(), &alert.correlation_id),
            alert_id: truncate_bytes(&alert.id, MAX_IDENTIFIER_BYTES),
            severity: alert.severity,
            source: truncate_bytes(&alert.source, MAX_IDENTIFIER_BYTES),
            tag: truncate_bytes(&alert.tag, MAX_NAME_BYTES),
            message: truncate_bytes(&alert.message, MAX_MESSAGE_BYTES),
            count: alert.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertAcknowledged {
    pub header: EventHeader,
    pub alert_id: String,
    pub acknowledged_by: String,
    pub acknowledged_at: DateTime<Utc>,
}

impl AlertAcknowledged {
    pub fn new(alert: &Alert, by: String, at: DateTime<Utc>) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Normal, &alert.correlation_id),
            alert_id: truncate_bytes(&alert.id, MAX_IDENTIFIER_BYTES),
            acknowledged_by: truncate_owned(by, MAX_NAME_BYTES),
            acknowledged_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertResolved {
    pub header: EventHeader,
    pub alert_id: String,
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
}

impl AlertResolved {
    pub fn new(alert: &Alert, by: String, at: DateTime<Utc>) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Normal, &alert.correlation_id),
            alert_id: truncate_bytes(&alert.id, MAX_IDENTIFIER_BYTES),
            resolved_by: truncate_owned(by, MAX_NAME_BYTES),
            resolved_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertDelivered {
    pub header: EventHeader,
    pub alert_id: String,
    pub channel: String,
    /// Delivery attempts made, including the successful one.
    pub attempts: u32,
    /// Batch size the alert was delivered in (1 when batching is off).
    pub batch_size: usize,
}

impl AlertDelivered {
    pub fn new(alert: &Alert, channel: &str, attempts: u32, batch_size: usize) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Low, &alert.correlation_id),
            alert_id: truncate_bytes(&alert.id, MAX_IDENTIFIER_BYTES),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            attempts,
            batch_size,
        }
    }
}

/// Why an alert was not delivered to a channel without being a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// The channel's rate limiter dropped the alert.
    RateLimited,
    /// The limiter asked for escalation but no emergency channel is registered.
    NoEmergencyChannel,
    /// An emergency channel could not take an escalated alert because its
    /// command queue was full or closed.
    EscalationTargetUnavailable,
    /// The channel was unregistered while the alert was still pending.
    ChannelUnregistered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertSuppressed {
    pub header: EventHeader,
    pub alert_id: String,
    pub channel: String,
    pub reason: SuppressionReason,
}

impl AlertSuppressed {
    pub fn new(alert: &Alert, channel: &str, reason: SuppressionReason) -> Self {
        Self {
            header: EventHeader::new(MessagePriority::Normal, &alert.correlation_id),
            alert_id: truncate_bytes(&alert.id, MAX_IDENTIFIER_BYTES),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct AlertDeliveryFailed {
    pub header: EventHeader,
    pub alert_id: String,
    pub channel: String,
    pub severity: Severity,
    /// Normalized error classification (`Timeout`, `Transport`, ...).
    pub error_type: String,
    pub error_message: String,
    /// Delivery attempts made so far.
    pub retry_count: u32,
    pub is_final_failure: bool,
}

impl AlertDeliveryFailed {
    pub fn new(
        alert: &Alert,
        channel: &str,
        error_type: &str,
        error_message: &str,
        retry_count: u32,
        is_final_failure: bool,
    ) -> Self {
        let priority = if is_final_failure {
            MessagePriority::High
        } else {
            MessagePriority::Normal
        };
        Self {
            header: EventHeader::new(priority, &alert.correlation_id),
            alert_id: truncate_bytes(&alert.id, MAX_IDENTIFIER_BYTES),
            channel: truncate_bytes(channel, MAX_NAME_BYTES),
            severity: alert.severity,
            error_type: truncate_bytes(error_type, MAX_IDENTIFIER_BYTES),
            error_message: truncate_bytes(error_message, MAX_MESSAGE_BYTES),
            retry_count,
            is_final_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_is_capped() {
        let alert = Alert::new("boom", Severity::Critical, "engine");
        let event =
            AlertDeliveryFailed::new(&alert, "pager", "Transport", &"x".repeat(4096), 3, true);
        assert_eq!(event.error_message.len(), MAX_MESSAGE_BYTES);
        assert_eq!(event.header.priority, MessagePriority::High);
        assert_eq!(event.header.correlation_id, alert.correlation_id);
    }

    #[test]
    fn raised_priority_follows_severity() {
        let alert = Alert::new("boom", Severity::Emergency, "engine");
        assert_eq!(AlertRaised::new(&alert).header.priority, MessagePriority::Critical);
    }
}
