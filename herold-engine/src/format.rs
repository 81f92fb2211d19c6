//! Message template rendering.
//!
//! Templates substitute `{placeholder}` tokens from the alert. Unknown tokens
//! are left untouched; config validation rejects them before a channel is
//! registered. Network channels escape values as JSON string contents so a
//! JSON template stays well formed.

use std::fmt::Write;

use herold_config::ChannelConfig;
use herold_core::{Alert, ChannelType};

pub fn format_alert(config: &ChannelConfig, alert: &Alert) -> String {
    let escape = config.channel_type == ChannelType::Network;
    let template = config.message_format.as_str();
    let mut out = String::with_capacity(template.len() + alert.message.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| placeholder(config, alert, &after[..close]).map(|v| (close, v)));
        match value {
            Some((close, value)) => {
                if escape {
                    push_json_escaped(&mut out, &value);
                } else {
                    out.push_str(&value);
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Renders each alert and joins them with `\n`.
pub fn format_batch(config: &ChannelConfig, alerts: &[Alert]) -> String {
    alerts
        .iter()
        .map(|alert| format_alert(config, alert))
        .collect::<Vec<_>>()
        .join("\n")
}

fn placeholder(config: &ChannelConfig, alert: &Alert, name: &str) -> Option<String> {
    let value = match name {
        "id" => alert.id.clone(),
        "message" => alert.message.clone(),
        "severity" => alert.severity.to_string(),
        "source" => alert.source.clone(),
        "tag" => alert.tag.clone(),
        "operation_id" => alert.operation_id.clone(),
        "correlation_id" => alert.correlation_id.clone(),
        "count" => alert.count.to_string(),
        "timestamp" => format_timestamp(config, alert),
        "channel" => config.name.clone(),
        _ => return None,
    };
    Some(value)
}

fn format_timestamp(config: &ChannelConfig, alert: &Alert) -> String {
    let mut rendered = String::new();
    if write!(rendered, "{}", alert.timestamp.format(&config.timestamp_format)).is_err() {
        return alert.timestamp.to_rfc3339();
    }
    rendered
}

fn push_json_escaped(out: &mut String, value: &str) {
    match serde_json::to_string(value) {
        Ok(quoted) => out.push_str(&quoted[1..quoted.len() - 1]),
        Err(_) => out.push_str(value),
    }
}
