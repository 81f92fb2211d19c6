//! Delivery channel configuration.
//!
//! A [`ChannelConfig`] is an immutable description of one delivery channel:
//! what it accepts (severity window, tag allow-list, source ignore-list), how it
//! formats and batches, and how it behaves under failure and load (retry
//! policy, send timeout, rate limit). Configs are built through the factories
//! or [`ChannelConfigBuilder`], both of which validate eagerly. Changing a
//! registered channel means registering a new instance.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use herold_core::{Alert, ChannelType, Severity};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicyConfig;
use crate::validation;

pub const DEFAULT_MESSAGE_FORMAT: &str = "[{timestamp}] [{severity}] {source}: {message}";
pub const DEFAULT_JSON_MESSAGE_FORMAT: &str = r#"{"id":"{id}","severity":"{severity}","source":"{source}","tag":"{tag}","message":"{message}","timestamp":"{timestamp}","count":{count},"correlation_id":"{correlation_id}"}"#;
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Configuration of a single delivery channel.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_channel))]
pub struct ChannelConfig {
    /// Unique channel key.
    #[validate(custom(function = validation::validate_channel_name))]
    pub name: String,

    pub channel_type: ChannelType,

    #[serde(default = "default_true")]
    pub is_enabled: bool,

    #[serde(default = "default_minimum_severity")]
    pub minimum_severity: Severity,

    #[serde(default = "default_maximum_severity")]
    pub maximum_severity: Severity,

    /// Tags this channel accepts. Empty accepts every tag.
    #[serde(default)]
    pub allowed_tags: BTreeSet<String>,

    /// Sources whose alerts this channel never receives.
    #[serde(default)]
    pub ignored_sources: BTreeSet<String>,

    #[validate(custom(function = validation::validate_message_format))]
    #[serde(default = "default_message_format")]
    pub message_format: String,

    #[validate(custom(function = validation::validate_timestamp_format))]
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    #[serde(default)]
    pub enable_batching: bool,

    #[validate(range(min = 1, max = 1_000))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hard upper bound on how long a partial batch waits (milliseconds).
    #[validate(range(min = 1, max = 3_600_000))]
    #[serde(default = "default_batch_flush_interval")]
    pub batch_flush_interval_ms: u64,

    #[validate(nested)]
    #[serde(default)]
    pub retry_policy: RetryPolicyConfig,

    /// Bound on a single delivery attempt (milliseconds).
    #[validate(range(min = 1, max = 300_000))]
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub enable_health_monitoring: bool,

    #[validate(range(min = 1))]
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_ms: u64,

    #[validate(nested)]
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Dispatch order; 1 is processed first.
    #[validate(range(min = 1, max = 1_000))]
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Receives escalated alerts with rate limiting bypassed.
    #[serde(default)]
    pub is_emergency_channel: bool,

    /// Backend-specific parameters (`endpoint`, `recipients`, ...).
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}
fn default_minimum_severity() -> Severity {
    Severity::Info
}
fn default_maximum_severity() -> Severity {
    Severity::Emergency
}
fn default_message_format() -> String {
    DEFAULT_MESSAGE_FORMAT.into()
}
fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.into()
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_flush_interval() -> u64 {
    5_000
}
fn default_send_timeout() -> u64 {
    10_000
}
fn default_health_check_interval() -> u64 {
    60_000
}
fn default_priority() -> u32 {
    100
}

impl ChannelConfig {
    /// Unvalidated base used by the factories and the builder.
    fn base(name: &str, channel_type: ChannelType) -> Self {
        let message_format = match channel_type {
            ChannelType::Network => DEFAULT_JSON_MESSAGE_FORMAT.into(),
            _ => default_message_format(),
        };
        Self {
            name: name.to_string(),
            channel_type,
            is_enabled: true,
            minimum_severity: default_minimum_severity(),
            maximum_severity: default_maximum_severity(),
            allowed_tags: BTreeSet::new(),
            ignored_sources: BTreeSet::new(),
            message_format,
            timestamp_format: default_timestamp_format(),
            enable_batching: false,
            batch_size: default_batch_size(),
            batch_flush_interval_ms: default_batch_flush_interval(),
            retry_policy: RetryPolicyConfig::default(),
            send_timeout_ms: default_send_timeout(),
            enable_health_monitoring: true,
            health_check_interval_ms: default_health_check_interval(),
            rate_limit: RateLimitConfig::default(),
            priority: default_priority(),
            is_emergency_channel: false,
            settings: BTreeMap::new(),
        }
    }

    pub fn builder(name: &str, channel_type: ChannelType) -> ChannelConfigBuilder {
        ChannelConfigBuilder {
            config: Self::base(name, channel_type),
        }
    }

    /// Application log channel. Accepts everything from `Info` up, never retries.
    pub fn create_log_channel(name: &str) -> Result<Self, ConfigError> {
        Self::builder(name, ChannelType::Log)
            .retry_policy(RetryPolicyConfig::disabled())
            .priority(500)
            .build()
    }

    /// Standard output channel for warnings and above.
    pub fn create_console_channel(name: &str) -> Result<Self, ConfigError> {
        Self::builder(name, ChannelType::Console)
            .minimum_severity(Severity::Warning)
            .retry_policy(RetryPolicyConfig::disabled())
            .priority(400)
            .build()
    }

    /// Webhook channel for errors and above, with batching and network retries.
    pub fn create_network_channel(name: &str, endpoint: &str) -> Result<Self, ConfigError> {
        Self::builder(name, ChannelType::Network)
            .minimum_severity(Severity::Error)
            .setting("endpoint", endpoint)
            .batching(20, Duration::from_secs(5))
            .retry_policy(RetryPolicyConfig::network())
            .send_timeout(Duration::from_secs(30))
            .rate_limit(RateLimitConfig::per_window(
                60,
                Duration::from_secs(60),
                10,
                crate::rate_limit::ExceededAction::Queue,
            ))
            .priority(200)
            .build()
    }

    /// Email channel for critical alerts. `recipients` is comma separated.
    pub fn create_email_channel(name: &str, recipients: &str) -> Result<Self, ConfigError> {
        Self::builder(name, ChannelType::Email)
            .minimum_severity(Severity::Critical)
            .setting("recipients", recipients)
            .batching(50, Duration::from_secs(60))
            .retry_policy(RetryPolicyConfig::network())
            .send_timeout(Duration::from_secs(60))
            .rate_limit(RateLimitConfig::per_window(
                10,
                Duration::from_secs(3_600),
                5,
                crate::rate_limit::ExceededAction::Escalate,
            ))
            .priority(300)
            .build()
    }

    /// Highest-priority channel that receives escalations.
    pub fn create_emergency_channel(
        name: &str,
        channel_type: ChannelType,
    ) -> Result<Self, ConfigError> {
        Self::builder(name, channel_type)
            .minimum_severity(Severity::Critical)
            .emergency(true)
            .priority(1)
            .build()
    }

    /// Validates and returns `self`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Whether this channel takes `alert`. Pure; evaluated before rate limiting.
    pub fn should_process_alert(&self, alert: &Alert) -> bool {
        if !self.is_enabled {
            return false;
        }
        if alert.severity < self.minimum_severity || alert.severity > self.maximum_severity {
            return false;
        }
        if !self.ignored_sources.is_empty() && self.ignored_sources.contains(&alert.source) {
            return false;
        }
        if !self.allowed_tags.is_empty() && !self.allowed_tags.contains(&alert.tag) {
            return false;
        }
        true
    }

    /// Ascending priority, ties broken by name.
    pub fn dispatch_order(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.name.cmp(&other.name))
    }

    pub fn batch_flush_interval(&self) -> Duration {
        Duration::from_millis(self.batch_flush_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Whether any field consulted by [`Self::should_process_alert`] differs.
    pub fn filter_differs(&self, other: &Self) -> bool {
        self.is_enabled != other.is_enabled
            || self.minimum_severity != other.minimum_severity
            || self.maximum_severity != other.maximum_severity
            || self.allowed_tags != other.allowed_tags
            || self.ignored_sources != other.ignored_sources
    }

    /// Names of the settings that differ between `self` and `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<String> {
        let mut changed = Vec::new();
        let mut check = |name: &str, differs: bool| {
            if differs {
                changed.push(name.to_string());
            }
        };
        check("channel_type", self.channel_type != other.channel_type);
        check("is_enabled", self.is_enabled != other.is_enabled);
        check("minimum_severity", self.minimum_severity != other.minimum_severity);
        check("maximum_severity", self.maximum_severity != other.maximum_severity);
        check("allowed_tags", self.allowed_tags != other.allowed_tags);
        check("ignored_sources", self.ignored_sources != other.ignored_sources);
        check("message_format", self.message_format != other.message_format);
        check("timestamp_format", self.timestamp_format != other.timestamp_format);
        check("enable_batching", self.enable_batching != other.enable_batching);
        check("batch_size", self.batch_size != other.batch_size);
        check(
            "batch_flush_interval_ms",
            self.batch_flush_interval_ms != other.batch_flush_interval_ms,
        );
        check("retry_policy", self.retry_policy != other.retry_policy);
        check("send_timeout_ms", self.send_timeout_ms != other.send_timeout_ms);
        check(
            "enable_health_monitoring",
            self.enable_health_monitoring != other.enable_health_monitoring,
        );
        check(
            "health_check_interval_ms",
            self.health_check_interval_ms != other.health_check_interval_ms,
        );
        check("rate_limit", self.rate_limit != other.rate_limit);
        check("priority", self.priority != other.priority);
        check(
            "is_emergency_channel",
            self.is_emergency_channel != other.is_emergency_channel,
        );
        check("settings", self.settings != other.settings);
        changed
    }
}

/// Step-by-step construction of a [`ChannelConfig`]; `build` validates.
#[derive(Debug, Clone)]
pub struct ChannelConfigBuilder {
    config: ChannelConfig,
}

impl ChannelConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.is_enabled = enabled;
        self
    }

    pub fn minimum_severity(mut self, severity: Severity) -> Self {
        self.config.minimum_severity = severity;
        self
    }

    pub fn maximum_severity(mut self, severity: Severity) -> Self {
        self.config.maximum_severity = severity;
        self
    }

    pub fn severity_range(self, minimum: Severity, maximum: Severity) -> Self {
        self.minimum_severity(minimum).maximum_severity(maximum)
    }

    pub fn allow_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.allowed_tags.insert(tag.into());
        self
    }

    pub fn ignore_source(mut self, source: impl Into<String>) -> Self {
        self.config.ignored_sources.insert(source.into());
        self
    }

    pub fn message_format(mut self, format: impl Into<String>) -> Self {
        self.config.message_format = format.into();
        self
    }

    pub fn timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.config.timestamp_format = format.into();
        self
    }

    pub fn batching(mut self, size: usize, flush_interval: Duration) -> Self {
        self.config.enable_batching = true;
        self.config.batch_size = size;
        self.config.batch_flush_interval_ms = flush_interval.as_millis() as u64;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicyConfig) -> Self {
        self.config.retry_policy = policy;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn health_monitoring(mut self, enabled: bool, interval: Duration) -> Self {
        self.config.enable_health_monitoring = enabled;
        self.config.health_check_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.config.rate_limit = limit;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn emergency(mut self, is_emergency: bool) -> Self {
        self.config.is_emergency_channel = is_emergency;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.settings.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ChannelConfig, ConfigError> {
        self.config.validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::ExceededAction;

    fn alert(severity: Severity) -> Alert {
        Alert::new("test", severity, "gameplay").with_tag("combat")
    }

    #[test]
    fn factories_produce_valid_channels() {
        ChannelConfig::create_log_channel("log").expect("log");
        ChannelConfig::create_console_channel("console").expect("console");
        ChannelConfig::create_network_channel("hook", "https://hooks.example.com/alerts")
            .expect("network");
        ChannelConfig::create_email_channel("mail", "ops@example.com").expect("email");
        let emergency = ChannelConfig::create_emergency_channel("pager", ChannelType::Custom)
            .expect("emergency");
        assert!(emergency.is_emergency_channel);
        assert_eq!(emergency.priority, 1);
    }

    #[test]
    fn network_channel_requires_endpoint() {
        assert!(ChannelConfig::create_network_channel("hook", "not a url").is_err());
        assert!(ChannelConfig::builder("hook", ChannelType::Network).build().is_err());
    }

    #[test]
    fn email_channel_requires_recipients() {
        assert!(ChannelConfig::create_email_channel("mail", " , ").is_err());
    }

    #[test]
    fn rejects_inverted_severity_range() {
        let result = ChannelConfig::builder("log", ChannelType::Log)
            .severity_range(Severity::Critical, Severity::Warning)
            .build();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let builder = || ChannelConfig::builder("log", ChannelType::Log);
        assert!(builder().priority(0).build().is_err());
        assert!(builder().priority(1001).build().is_err());
        assert!(builder().batching(0, Duration::from_secs(1)).build().is_err());
        assert!(builder().batching(10, Duration::from_secs(3_601)).build().is_err());
        assert!(builder().send_timeout(Duration::from_secs(301)).build().is_err());
        assert!(builder().message_format("{nope}").build().is_err());
        assert!(ChannelConfig::builder("", ChannelType::Log).build().is_err());
    }

    #[test]
    fn nested_policy_errors_surface() {
        let policy = RetryPolicyConfig {
            base_delay_ms: 10_000,
            max_delay_ms: 10,
            ..RetryPolicyConfig::default()
        };
        let result = ChannelConfig::builder("log", ChannelType::Log).retry_policy(policy).build();
        assert!(result.is_err());
    }

    #[test]
    fn severity_window_filters() {
        let channel = ChannelConfig::builder("ops", ChannelType::Log)
            .severity_range(Severity::Warning, Severity::Emergency)
            .build()
            .unwrap();
        assert!(!channel.should_process_alert(&alert(Severity::Info)));
        assert!(channel.should_process_alert(&alert(Severity::Warning)));
        assert!(channel.should_process_alert(&alert(Severity::Emergency)));

        let capped = ChannelConfig::builder("ops", ChannelType::Log)
            .severity_range(Severity::Info, Severity::Error)
            .build()
            .unwrap();
        assert!(!capped.should_process_alert(&alert(Severity::Critical)));
    }

    #[test]
    fn filter_is_pure_and_tracks_minimum_severity() {
        let alert = alert(Severity::Error);
        let channel = ChannelConfig::create_log_channel("log").unwrap();
        assert!(channel.should_process_alert(&alert));
        assert!(channel.should_process_alert(&alert));

        let stricter = ChannelConfig::builder("log", ChannelType::Log)
            .minimum_severity(Severity::Critical)
            .build()
            .unwrap();
        assert!(!stricter.should_process_alert(&alert));
    }

    #[test]
    fn disabled_channel_takes_nothing() {
        let channel = ChannelConfig::builder("log", ChannelType::Log)
            .enabled(false)
            .build()
            .unwrap();
        assert!(!channel.should_process_alert(&alert(Severity::Emergency)));
    }

    #[test]
    fn ignored_sources_and_allowed_tags() {
        let channel = ChannelConfig::builder("log", ChannelType::Log)
            .ignore_source("gameplay")
            .build()
            .unwrap();
        assert!(!channel.should_process_alert(&alert(Severity::Error)));

        let tagged = ChannelConfig::builder("log", ChannelType::Log)
            .allow_tag("network")
            .build()
            .unwrap();
        assert!(!tagged.should_process_alert(&alert(Severity::Error)));
        let tagged = ChannelConfig::builder("log", ChannelType::Log)
            .allow_tag("combat")
            .build()
            .unwrap();
        assert!(tagged.should_process_alert(&alert(Severity::Error)));
    }

    #[test]
    fn dispatch_order_uses_priority_then_name() {
        let mut channels = vec![
            ChannelConfig::builder("b", ChannelType::Log).priority(10).build().unwrap(),
            ChannelConfig::builder("a", ChannelType::Log).priority(10).build().unwrap(),
            ChannelConfig::builder("z", ChannelType::Log).priority(1).build().unwrap(),
        ];
        channels.sort_by(|a, b| a.dispatch_order(b));
        let names: Vec<_> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["z", "a", "b"]);
    }

    #[test]
    fn changed_fields_reports_differences() {
        let old = ChannelConfig::create_log_channel("log").unwrap();
        let new = ChannelConfig::builder("log", ChannelType::Log)
            .retry_policy(RetryPolicyConfig::disabled())
            .priority(500)
            .minimum_severity(Severity::Warning)
            .rate_limit(RateLimitConfig::per_window(
                1,
                Duration::from_secs(1),
                1,
                ExceededAction::Drop,
            ))
            .build()
            .unwrap();
        assert_eq!(old.changed_fields(&new), ["minimum_severity", "rate_limit"]);
        assert!(old.filter_differs(&new));
        assert!(!old.filter_differs(&old.clone()));
    }
}
