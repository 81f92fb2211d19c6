//! The alert record consumed by the dispatch engine.
//!
//! Alerts are produced by an alert service. The engine only ever reads them;
//! the lifecycle mutators below exist for the producing side and return the
//! event describing the change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{AlertAcknowledged, AlertResolved};
use crate::severity::Severity;
use crate::text::{truncate_owned, MAX_IDENTIFIER_BYTES, MAX_MESSAGE_BYTES, MAX_NAME_BYTES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Filled in by [`Alert::normalized`] when absent.
    #[serde(default)]
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Number of times an identical alert was raised and folded into this one.
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

fn default_count() -> u32 {
    1
}

impl Alert {
    pub fn new(message: impl Into<String>, severity: Severity, source: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            correlation_id: id.clone(),
            id,
            message: truncate_owned(message.into(), MAX_MESSAGE_BYTES),
            severity,
            source: truncate_owned(source.into(), MAX_IDENTIFIER_BYTES),
            tag: String::new(),
            operation_id: String::new(),
            timestamp: Utc::now(),
            count: 1,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = truncate_owned(tag.into(), MAX_NAME_BYTES);
        self
    }

    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = truncate_owned(operation_id.into(), MAX_IDENTIFIER_BYTES);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = truncate_owned(correlation_id.into(), MAX_IDENTIFIER_BYTES);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Re-applies the field caps. Used on alerts that arrive deserialized
    /// rather than through [`Alert::new`].
    pub fn normalized(mut self) -> Self {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.correlation_id.is_empty() {
            self.correlation_id = self.id.clone();
        }
        self.id = truncate_owned(self.id, MAX_IDENTIFIER_BYTES);
        self.message = truncate_owned(self.message, MAX_MESSAGE_BYTES);
        self.source = truncate_owned(self.source, MAX_IDENTIFIER_BYTES);
        self.tag = truncate_owned(self.tag, MAX_NAME_BYTES);
        self.operation_id = truncate_owned(self.operation_id, MAX_IDENTIFIER_BYTES);
        self.correlation_id = truncate_owned(self.correlation_id, MAX_IDENTIFIER_BYTES);
        self.count = self.count.max(1);
        self
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Folds another occurrence of the same alert into this one.
    pub fn record_duplicate(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    pub fn acknowledge(&mut self, by: impl Into<String>) -> AlertAcknowledged {
        let by = truncate_owned(by.into(), MAX_NAME_BYTES);
        let at = Utc::now();
        self.acknowledged_at = Some(at);
        self.acknowledged_by = Some(by.clone());
        AlertAcknowledged::new(self, by, at)
    }

    pub fn resolve(&mut self, by: impl Into<String>) -> AlertResolved {
        let by = truncate_owned(by.into(), MAX_NAME_BYTES);
        let at = Utc::now();
        self.resolved_at = Some(at);
        self.resolved_by = Some(by.clone());
        AlertResolved::new(self, by, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_alert_correlates_with_itself() {
        let alert = Alert::new("disk full", Severity::Error, "storage");
        assert_eq!(alert.correlation_id, alert.id);
        assert_eq!(alert.count, 1);
    }

    #[test]
    fn oversized_fields_are_truncated() {
        let alert = Alert::new("m".repeat(2000), Severity::Info, "s".repeat(500))
            .with_tag("t".repeat(100));
        assert_eq!(alert.message.len(), MAX_MESSAGE_BYTES);
        assert_eq!(alert.source.len(), MAX_IDENTIFIER_BYTES);
        assert_eq!(alert.tag.len(), MAX_NAME_BYTES);
    }

    #[test]
    fn acknowledge_and_resolve_set_lifecycle_fields() {
        let mut alert = Alert::new("net down", Severity::Critical, "network");
        let ack = alert.acknowledge("oncall");
        assert!(alert.is_acknowledged());
        assert_eq!(ack.alert_id, alert.id);
        assert_eq!(ack.acknowledged_by, "oncall");

        let resolved = alert.resolve("oncall");
        assert!(alert.is_resolved());
        assert_eq!(resolved.header.correlation_id, alert.correlation_id);
    }

    #[test]
    fn deserialized_alerts_get_defaults() {
        let alert: Alert = serde_json::from_str(
            r#"{"id":"","message":"hi","severity":"warning","source":"game"}"#,
        )
        .unwrap();
        let alert = alert.normalized();
        assert!(!alert.id.is_empty());
        assert_eq!(alert.count, 1);
        assert_eq!(alert.correlation_id, alert.id);
    }

    #[test]
    fn duplicates_increment_count() {
        let mut alert = Alert::new("x", Severity::Info, "y");
        alert.record_duplicate();
        alert.record_duplicate();
        assert_eq!(alert.count, 3);
    }
}
