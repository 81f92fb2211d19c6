#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herold_config::{ChannelConfig, DispatchConfig, RetryPolicyConfig};
use herold_core::events::{
    AlertDelivered, AlertDeliveryFailed, AlertEvent, AlertSuppressed, ChannelHealthChanged,
};
use herold_core::ChannelType;
use herold_engine::{
    AlertDispatchEngine, BackendRegistry, DeliveryBackend, DeliveryError, DeliveryRequest,
    MemorySink,
};
use herold_telemetry::MetricsRecorder;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub attempt: u32,
    pub alert_ids: Vec<String>,
    pub message: String,
}

/// Records every request. Fails the first `failures` calls with `error`.
pub struct RecordingBackend {
    failures: AtomicUsize,
    error: DeliveryError,
    calls: Mutex<Vec<Call>>,
}

impl RecordingBackend {
    pub fn ok() -> Arc<Self> {
        Self::failing(0, DeliveryError::Transport("unused".into()))
    }

    pub fn failing(failures: usize, error: DeliveryError) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            error,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always_failing(error: DeliveryError) -> Arc<Self> {
        Self::failing(usize::MAX, error)
    }

    pub fn recover(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.calls().into_iter().flat_map(|c| c.alert_ids).collect()
    }
}

#[async_trait]
impl DeliveryBackend for RecordingBackend {
    async fn send(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        self.calls.lock().push(Call {
            at: Instant::now(),
            attempt: request.attempt,
            alert_ids: request.alerts.iter().map(|a| a.id.clone()).collect(),
            message: request.message.clone(),
        });
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

/// Never completes.
pub struct HangingBackend;

#[async_trait]
impl DeliveryBackend for HangingBackend {
    async fn send(&self, _request: &DeliveryRequest) -> Result<(), DeliveryError> {
        std::future::pending().await
    }
}

pub struct PanickingBackend;

#[async_trait]
impl DeliveryBackend for PanickingBackend {
    async fn send(&self, _request: &DeliveryRequest) -> Result<(), DeliveryError> {
        panic!("backend exploded");
    }
}

pub fn engine() -> (AlertDispatchEngine, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let metrics = Arc::new(MetricsRecorder::new("herold_test").expect("metrics"));
    let engine = AlertDispatchEngine::new(
        DispatchConfig::seeded(7),
        BackendRegistry::with_defaults(),
        sink.clone(),
        metrics,
    );
    (engine, sink)
}

pub fn retry(max_attempts: u32, base_ms: u64) -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_attempts,
        base_delay_ms: base_ms,
        max_delay_ms: base_ms * 100,
        backoff_multiplier: 2.0,
        jitter_enabled: false,
        jitter_max_percentage: 0.0,
    }
}

/// Unbatched custom channel with retries disabled.
pub fn channel(name: &str) -> herold_config::ChannelConfigBuilder {
    ChannelConfig::builder(name, ChannelType::Custom).retry_policy(RetryPolicyConfig::disabled())
}

pub fn delivered(sink: &MemorySink) -> Vec<AlertDelivered> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e {
            AlertEvent::AlertDelivered(e) => Some(e),
            _ => None,
        })
        .collect()
}

pub fn failures(sink: &MemorySink) -> Vec<AlertDeliveryFailed> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e {
            AlertEvent::AlertDeliveryFailed(e) => Some(e),
            _ => None,
        })
        .collect()
}

pub fn suppressed(sink: &MemorySink) -> Vec<AlertSuppressed> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e {
            AlertEvent::AlertSuppressed(e) => Some(e),
            _ => None,
        })
        .collect()
}

pub fn health_changes(sink: &MemorySink) -> Vec<ChannelHealthChanged> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e {
            AlertEvent::ChannelHealthChanged(e) => Some(e),
            _ => None,
        })
        .collect()
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
