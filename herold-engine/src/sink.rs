//! Event sinks: where the engine publishes [`AlertEvent`]s.
//!
//! Publishing is fire-and-forget. A sink must not block and must swallow its
//! own errors; a failing observer never affects dispatch.

use std::sync::Arc;

use herold_core::events::AlertEvent;
use herold_telemetry::EventLogger;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

pub trait EventSink: Send + Sync {
    fn publish(&self, event: AlertEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: AlertEvent) {}
}

/// Fans events out to any number of async subscribers. Slow subscribers lag
/// and lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<AlertEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: AlertEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}

/// Logs each event through [`EventLogger`] with its fields as key/values.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: AlertEvent) {
        EventLogger::log_event(event.kind(), event_metadata(&event));
    }
}

/// Flattens an event's top-level fields into key/values.
pub fn event_metadata(event: &AlertEvent) -> Vec<KeyValue> {
    let header = event.header();
    let mut metadata = vec![
        KeyValue::new("event_id", header.id.to_string()),
        KeyValue::new("correlation_id", header.correlation_id.clone()),
    ];
    if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(event) {
        for (key, value) in fields {
            if key == "type" || key == "header" {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            metadata.push(KeyValue::new(key, value));
        }
    }
    metadata
}

/// Publishes to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn publish(&self, event: AlertEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(event.clone());
            }
            last.publish(event);
        }
    }
}

/// Keeps every event in memory. Used by the simulator and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AlertEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<AlertEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: AlertEvent) {
        self.events.lock().push(event);
    }
}
