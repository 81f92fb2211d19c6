// herold-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::collections::HashSet;

use chrono::format::{Item, StrftimeItems};
use herold_core::ChannelType;
use validator::{ValidateUrl, ValidationError};

use crate::channel::ChannelConfig;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicyConfig;

/// Placeholders understood by the message formatter.
pub const MESSAGE_PLACEHOLDERS: [&str; 10] = [
    "id",
    "message",
    "severity",
    "source",
    "tag",
    "operation_id",
    "correlation_id",
    "count",
    "timestamp",
    "channel",
];

fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// Validate that a channel name is a short identifier.
pub fn validate_channel_name(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[A-Za-z0-9_.-]{1,64}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(error(
            "invalid_channel_name",
            "channel names are 1-64 characters of [A-Za-z0-9_.-]",
        ))
    }
}

/// Validate that a timestamp format is a well-formed strftime pattern.
pub fn validate_timestamp_format(format: &str) -> Result<(), ValidationError> {
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(error(
            "invalid_timestamp_format",
            "timestamp format is not a valid strftime pattern",
        ));
    }
    Ok(())
}

/// Validate that a message template only references known placeholders.
pub fn validate_message_format(format: &str) -> Result<(), ValidationError> {
    if format.trim().is_empty() {
        return Err(error("empty_message_format", "message format must not be empty"));
    }
    let re = regex::Regex::new(r"\{([a-z_]+)\}")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    let unknown = re
        .captures_iter(format)
        .filter_map(|c| c.get(1))
        .any(|m| !MESSAGE_PLACEHOLDERS.contains(&m.as_str()));
    if unknown {
        Err(error(
            "unknown_placeholder",
            "message format references an unknown placeholder",
        ))
    } else {
        Ok(())
    }
}

/// `max_delay_ms` must not be below `base_delay_ms`.
pub fn validate_retry_policy(policy: &RetryPolicyConfig) -> Result<(), ValidationError> {
    if policy.max_delay_ms < policy.base_delay_ms {
        return Err(error(
            "max_delay_below_base",
            "max_delay_ms must be greater than or equal to base_delay_ms",
        ));
    }
    Ok(())
}

/// The queue bounds only matter for the queue action, but must stay positive.
pub fn validate_rate_limit(limit: &RateLimitConfig) -> Result<(), ValidationError> {
    if limit.max_queue_delay_ms == 0 {
        return Err(error("zero_queue_delay", "max_queue_delay_ms must be positive"));
    }
    Ok(())
}

/// Cross-field channel invariants: severity ordering and backend settings.
pub fn validate_channel(channel: &ChannelConfig) -> Result<(), ValidationError> {
    if channel.minimum_severity > channel.maximum_severity {
        return Err(error(
            "severity_range",
            "minimum_severity must not exceed maximum_severity",
        ));
    }

    match channel.channel_type {
        ChannelType::Network => {
            let endpoint = channel.settings.get("endpoint");
            if !endpoint.is_some_and(|url: &String| url.validate_url()) {
                return Err(error(
                    "invalid_endpoint",
                    "network channels need a valid settings.endpoint URL",
                ));
            }
        }
        ChannelType::Email => {
            let has_recipients = channel
                .settings
                .get("recipients")
                .is_some_and(|r| r.split(',').any(|addr| !addr.trim().is_empty()));
            if !has_recipients {
                return Err(error(
                    "missing_recipients",
                    "email channels need settings.recipients",
                ));
            }
        }
        ChannelType::Log | ChannelType::Console | ChannelType::Custom => {}
    }
    Ok(())
}

/// Channel names must be unique across the configuration.
pub fn validate_unique_names(channels: &[ChannelConfig]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    if channels.iter().all(|c| seen.insert(c.name.as_str())) {
        Ok(())
    } else {
        Err(error("duplicate_channel", "channel names must be unique"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert!(validate_channel_name("ops-pager.v2").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("has space").is_err());
        assert!(validate_channel_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn timestamp_formats() {
        assert!(validate_timestamp_format("%Y-%m-%d %H:%M:%S").is_ok());
        assert!(validate_timestamp_format("%Q").is_err());
        assert!(validate_timestamp_format("").is_err());
    }

    #[test]
    fn message_formats() {
        assert!(validate_message_format("[{severity}] {source}: {message}").is_ok());
        assert!(validate_message_format(r#"{"text":"{message}"}"#).is_ok());
        assert!(validate_message_format("{bogus}").is_err());
    }
}
