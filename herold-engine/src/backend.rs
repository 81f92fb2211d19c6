//! Delivery backends: the transport behind each channel type.
//!
//! A backend receives one [`DeliveryRequest`] per attempt. It must not retry
//! on its own; retries, timeouts and panics are handled by the channel worker.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use herold_config::ChannelConfig;
use herold_core::{Alert, ChannelType, Severity};
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;

/// One delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub channel: Arc<ChannelConfig>,
    /// Rendered message; batched alerts are joined with `\n`.
    pub message: String,
    pub alerts: Vec<Alert>,
    /// 1 for the first attempt.
    pub attempt: u32,
}

impl DeliveryRequest {
    /// Highest severity in the request.
    pub fn severity(&self) -> Severity {
        self.alerts
            .iter()
            .map(|a| a.severity)
            .max()
            .unwrap_or(Severity::Info)
    }
}

#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError>;
}

/// Writes deliveries to the application log at the request's severity.
#[derive(Debug, Default, Clone)]
pub struct LogBackend;

#[async_trait]
impl DeliveryBackend for LogBackend {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        let channel = request.channel.name.as_str();
        let message = request.message.as_str();
        match request.severity() {
            Severity::Debug => debug!(channel = channel, "{message}"),
            Severity::Info => info!(channel = channel, "{message}"),
            Severity::Warning => warn!(channel = channel, "{message}"),
            Severity::Error | Severity::Critical | Severity::Emergency => {
                error!(channel = channel, "{message}")
            }
        }
        Ok(())
    }
}

/// Writes deliveries to standard output, one line per alert.
#[derive(Debug, Default, Clone)]
pub struct ConsoleBackend;

#[async_trait]
impl DeliveryBackend for ConsoleBackend {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", request.message)?;
        out.flush()?;
        Ok(())
    }
}

/// Maps channel types to the backend that serves them.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<ChannelType, Arc<dyn DeliveryBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the log and console backends installed. Network, email
    /// and custom transports are supplied by the host.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ChannelType::Log, Arc::new(LogBackend));
        registry.register(ChannelType::Console, Arc::new(ConsoleBackend));
        registry
    }

    /// Installs `backend` for `channel_type`, replacing any previous one.
    pub fn register(
        &mut self,
        channel_type: ChannelType,
        backend: Arc<dyn DeliveryBackend>,
    ) -> &mut Self {
        self.backends.insert(channel_type, backend);
        self
    }

    pub fn get(&self, channel_type: ChannelType) -> Option<Arc<dyn DeliveryBackend>> {
        self.backends.get(&channel_type).cloned()
    }

    pub fn contains(&self, channel_type: ChannelType) -> bool {
        self.backends.contains_key(&channel_type)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.backends.keys().collect();
        types.sort();
        f.debug_struct("BackendRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn request(severity: Severity) -> DeliveryRequest {
        DeliveryRequest {
            channel: Arc::new(ChannelConfig::create_log_channel("ops-log").unwrap()),
            message: "disk almost full".into(),
            alerts: vec![Alert::new("disk almost full", severity, "storage")],
            attempt: 1,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn log_backend_uses_alert_severity() {
        LogBackend.send(&request(Severity::Critical)).await.unwrap();
        assert!(logs_contain("disk almost full"));
        assert!(logs_contain("ERROR"));
    }

    #[test]
    fn defaults_cover_local_channels() {
        let registry = BackendRegistry::with_defaults();
        assert!(registry.contains(ChannelType::Log));
        assert!(registry.contains(ChannelType::Console));
        assert!(registry.get(ChannelType::Network).is_none());
    }

    #[test]
    fn request_severity_is_the_maximum() {
        let mut request = request(Severity::Warning);
        request.alerts.push(Alert::new("x", Severity::Emergency, "y"));
        assert_eq!(request.severity(), Severity::Emergency);
    }
}
