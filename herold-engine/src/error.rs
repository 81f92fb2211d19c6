use std::time::Duration;

use herold_config::ConfigError;
use herold_core::ChannelType;
use serde::Serialize;
use thiserror::Error;

/// Errors returned by engine operations. Per-alert outcomes never surface
/// here; they are published as events.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel already registered: {0}")]
    DuplicateChannel(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("No delivery backend for channel type {0}")]
    MissingBackend(ChannelType),

    #[error("Dispatch engine is shut down")]
    Closed,
}

/// Classification carried in `AlertDeliveryFailed::error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeliveryErrorKind {
    Timeout,
    Transport,
    Rejected,
    Panic,
    QueueTimeout,
    QueueOverflow,
}

impl DeliveryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryErrorKind::Timeout => "Timeout",
            DeliveryErrorKind::Transport => "Transport",
            DeliveryErrorKind::Rejected => "Rejected",
            DeliveryErrorKind::Panic => "Panic",
            DeliveryErrorKind::QueueTimeout => "QueueTimeout",
            DeliveryErrorKind::QueueOverflow => "QueueOverflow",
        }
    }
}

impl std::fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a delivery did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("send did not complete within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    /// The receiver refused the message. Not retried.
    #[error("rejected by receiver: {0}")]
    Rejected(String),

    #[error("backend panicked: {0}")]
    Panic(String),

    #[error("waited {0:?} in the rate limit queue")]
    QueueTimeout(Duration),

    #[error("evicted from a full rate limit queue of {0}")]
    QueueOverflow(usize),
}

impl DeliveryError {
    pub fn kind(&self) -> DeliveryErrorKind {
        match self {
            DeliveryError::Timeout(_) => DeliveryErrorKind::Timeout,
            DeliveryError::Transport(_) => DeliveryErrorKind::Transport,
            DeliveryError::Rejected(_) => DeliveryErrorKind::Rejected,
            DeliveryError::Panic(_) => DeliveryErrorKind::Panic,
            DeliveryError::QueueTimeout(_) => DeliveryErrorKind::QueueTimeout,
            DeliveryError::QueueOverflow(_) => DeliveryErrorKind::QueueOverflow,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Timeout(_) | DeliveryError::Transport(_) | DeliveryError::Panic(_)
        )
    }
}

impl From<std::io::Error> for DeliveryError {
    fn from(error: std::io::Error) -> Self {
        DeliveryError::Transport(error.to_string())
    }
}
