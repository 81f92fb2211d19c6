//! Delivery channel kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The kind of backend a channel delivers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Structured application log.
    Log,
    /// Process standard output.
    Console,
    /// HTTP webhook.
    Network,
    /// Email relay.
    Email,
    /// Host-provided backend.
    Custom,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Log => "log",
            ChannelType::Console => "console",
            ChannelType::Network => "network",
            ChannelType::Email => "email",
            ChannelType::Custom => "custom",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(ChannelType::Log),
            "console" => Ok(ChannelType::Console),
            "network" | "webhook" => Ok(ChannelType::Network),
            "email" => Ok(ChannelType::Email),
            "custom" => Ok(ChannelType::Custom),
            _ => Err(CoreError::UnknownChannelType(s.to_string())),
        }
    }
}
