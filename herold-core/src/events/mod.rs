//! ## herold-core::events
//! **Immutable event payloads published by the dispatch engine**
//!
//! Every event carries an [`EventHeader`] (unique id, UTC timestamp, routing
//! priority, correlation id). String fields are byte-capped at construction;
//! payload structs are `#[non_exhaustive]` so the caps cannot be bypassed with
//! struct literals from other crates.

mod alert;
mod channel;
mod system;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::severity::Severity;
use crate::text::{truncate_owned, MAX_IDENTIFIER_BYTES};

pub use alert::{
    AlertAcknowledged, AlertDelivered, AlertDeliveryFailed, AlertRaised, AlertResolved,
    AlertSuppressed, SuppressionReason,
};
pub use channel::{
    ChannelConfigurationChanged, ChannelHealthChanged, ChannelRegistered, ChannelUnregistered,
    FilterConfigurationChanged, FilterStatisticsUpdated,
};
pub use system::{health_ratio, AlertSystemHealthChanged};

/// Routing priority of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

impl From<Severity> for MessagePriority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Debug | Severity::Info => MessagePriority::Low,
            Severity::Warning => MessagePriority::Normal,
            Severity::Error => MessagePriority::High,
            Severity::Critical | Severity::Emergency => MessagePriority::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct EventHeader {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub priority: MessagePriority,
    pub correlation_id: String,
}

impl EventHeader {
    /// Creates a header. An empty correlation id is replaced by the event id.
    pub fn new(priority: MessagePriority, correlation_id: &str) -> Self {
        let id = Uuid::new_v4();
        let correlation_id = if correlation_id.is_empty() {
            id.to_string()
        } else {
            truncate_owned(correlation_id.to_string(), MAX_IDENTIFIER_BYTES)
        };
        Self {
            id,
            timestamp: Utc::now(),
            priority,
            correlation_id,
        }
    }
}

/// Everything the engine can publish to an event sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AlertEvent {
    AlertRaised(AlertRaised),
    AlertAcknowledged(AlertAcknowledged),
    AlertResolved(AlertResolved),
    AlertDelivered(AlertDelivered),
    AlertSuppressed(AlertSuppressed),
    AlertDeliveryFailed(AlertDeliveryFailed),
    ChannelRegistered(ChannelRegistered),
    ChannelUnregistered(ChannelUnregistered),
    ChannelHealthChanged(ChannelHealthChanged),
    ChannelConfigurationChanged(ChannelConfigurationChanged),
    FilterConfigurationChanged(FilterConfigurationChanged),
    FilterStatisticsUpdated(FilterStatisticsUpdated),
    AlertSystemHealthChanged(AlertSystemHealthChanged),
}

impl AlertEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            AlertEvent::AlertRaised(e) => &e.header,
            AlertEvent::AlertAcknowledged(e) => &e.header,
            AlertEvent::AlertResolved(e) => &e.header,
            AlertEvent::AlertDelivered(e) => &e.header,
            AlertEvent::AlertSuppressed(e) => &e.header,
            AlertEvent::AlertDeliveryFailed(e) => &e.header,
            AlertEvent::ChannelRegistered(e) => &e.header,
            AlertEvent::ChannelUnregistered(e) => &e.header,
            AlertEvent::ChannelHealthChanged(e) => &e.header,
            AlertEvent::ChannelConfigurationChanged(e) => &e.header,
            AlertEvent::FilterConfigurationChanged(e) => &e.header,
            AlertEvent::FilterStatisticsUpdated(e) => &e.header,
            AlertEvent::AlertSystemHealthChanged(e) => &e.header,
        }
    }

    /// Stable event name, used as the structured-log event type.
    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::AlertRaised(_) => "alert_raised",
            AlertEvent::AlertAcknowledged(_) => "alert_acknowledged",
            AlertEvent::AlertResolved(_) => "alert_resolved",
            AlertEvent::AlertDelivered(_) => "alert_delivered",
            AlertEvent::AlertSuppressed(_) => "alert_suppressed",
            AlertEvent::AlertDeliveryFailed(_) => "alert_delivery_failed",
            AlertEvent::ChannelRegistered(_) => "channel_registered",
            AlertEvent::ChannelUnregistered(_) => "channel_unregistered",
            AlertEvent::ChannelHealthChanged(_) => "channel_health_changed",
            AlertEvent::ChannelConfigurationChanged(_) => "channel_configuration_changed",
            AlertEvent::FilterConfigurationChanged(_) => "filter_configuration_changed",
            AlertEvent::FilterStatisticsUpdated(_) => "filter_statistics_updated",
            AlertEvent::AlertSystemHealthChanged(_) => "alert_system_health_changed",
        }
    }
}

macro_rules! impl_from_payload {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for AlertEvent {
                fn from(event: $variant) -> Self {
                    AlertEvent::$variant(event)
                }
            }
        )*
    };
}

impl_from_payload!(
    AlertRaised,
    AlertAcknowledged,
    AlertResolved,
    AlertDelivered,
    AlertSuppressed,
    AlertDeliveryFailed,
    ChannelRegistered,
    ChannelUnregistered,
    ChannelHealthChanged,
    ChannelConfigurationChanged,
    FilterConfigurationChanged,
    FilterStatisticsUpdated,
    AlertSystemHealthChanged,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_correlation_falls_back_to_event_id() {
        let header = EventHeader::new(MessagePriority::Normal, "");
        assert_eq!(header.correlation_id, header.id.to_string());
    }

    #[test]
    fn severity_maps_to_priority() {
        assert_eq!(MessagePriority::from(Severity::Info), MessagePriority::Low);
        assert_eq!(MessagePriority::from(Severity::Emergency), MessagePriority::Critical);
    }

    #[test]
    fn serialized_events_are_tagged() {
        let event: AlertEvent = ChannelUnregistered::new("ops", 2).into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ChannelUnregistered");
        assert_eq!(json["channel"], "ops");
        assert_eq!(event.kind(), "channel_unregistered");
    }
}
