//! The dispatch engine facade.
//!
//! `dispatch` evaluates every registered channel's filter in dispatch order
//! (ascending priority, then name) and hands passing alerts to that
//! channel's worker. Everything after the hand-off
//! (rate limiting, batching, delivery, retries, escalation) runs on the
//! worker and is reported through the event sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use herold_config::{ChannelConfig, DispatchConfig, HeroldConfig};
use herold_core::events::{
    AlertRaised, ChannelConfigurationChanged, ChannelRegistered, ChannelUnregistered,
    FilterConfigurationChanged, FilterStatisticsUpdated,
};
use herold_core::Alert;
use herold_telemetry::MetricsRecorder;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendRegistry, DeliveryBackend};
use crate::error::DispatchError;
use crate::health::HealthSnapshot;
use crate::shared::{ChannelHandle, EngineShared};
use crate::sink::EventSink;
use crate::stats::{ChannelStatistics, ChannelStatisticsSnapshot};
use crate::worker::{ChannelCommand, ChannelWorker};

/// Where one dispatched alert went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub alert_id: String,
    /// Channels whose filter passed, in dispatch order.
    pub routed: Vec<String>,
    pub filtered: Vec<String>,
}

impl DispatchReport {
    pub fn is_routed(&self) -> bool {
        !self.routed.is_empty()
    }
}

pub struct AlertDispatchEngine {
    shared: Arc<EngineShared>,
    backends: BackendRegistry,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl AlertDispatchEngine {
    pub fn new(
        config: DispatchConfig,
        backends: BackendRegistry,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared::new(config, sink, metrics)),
            backends,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Builds an engine and registers every channel in `config`.
    pub fn from_config(
        config: &HeroldConfig,
        backends: BackendRegistry,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self, DispatchError> {
        let engine = Self::new(config.dispatch.clone(), backends, sink, metrics);
        for channel in &config.channels {
            engine.register_channel(channel.clone())?;
        }
        Ok(engine)
    }

    /// Registers a channel served by the backend installed for its type.
    /// Must be called from within a Tokio runtime.
    pub fn register_channel(&self, config: ChannelConfig) -> Result<(), DispatchError> {
        let backend = self
            .backends
            .get(config.channel_type)
            .ok_or(DispatchError::MissingBackend(config.channel_type))?;
        self.register_channel_with_backend(config, backend)
    }

    pub fn register_channel_with_backend(
        &self,
        config: ChannelConfig,
        backend: Arc<dyn DeliveryBackend>,
    ) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let config = Arc::new(config.validated()?);
        let name = config.name.clone();

        {
            let mut channels = self.shared.channels.write();
            if channels.contains_key(&name) {
                return Err(DispatchError::DuplicateChannel(name));
            }
            let capacity = self.shared.config.command_queue_capacity.max(1);
            let (commands, receiver) = mpsc::channel(capacity);
            let cancel = self.cancel.child_token();
            let stats = Arc::new(ChannelStatistics::default());
            let worker = ChannelWorker::new(
                config.clone(),
                backend.clone(),
                receiver,
                cancel.clone(),
                self.shared.clone(),
                stats.clone(),
                self.channel_rng(&name),
            );
            let task = tokio::spawn(worker.run());
            channels.insert(
                name.clone(),
                ChannelHandle {
                    config: config.clone(),
                    backend,
                    commands,
                    cancel,
                    task,
                    stats,
                },
            );
        }

        let system = self
            .shared
            .health
            .lock()
            .register(&name, self.shared.active_alerts());
        self.shared.metrics.set_channel_health(&name, true);
        info!(
            channel = %name,
            channel_type = %config.channel_type,
            priority = config.priority,
            emergency = config.is_emergency_channel,
            "Channel registered"
        );
        self.shared.publish(ChannelRegistered::new(
            &name,
            config.channel_type,
            config.priority,
            config.is_emergency_channel,
        ));
        if let Some(system) = system {
            self.shared.metrics.system_health.set(system.current_ratio);
            self.shared.publish(system);
        }
        Ok(())
    }

    /// Stops the channel's worker and discards everything it still held.
    /// Returns the number of discarded alerts.
    pub async fn unregister_channel(&self, name: &str) -> Result<usize, DispatchError> {
        let handle = self
            .shared
            .channels
            .write()
            .remove(name)
            .ok_or_else(|| DispatchError::UnknownChannel(name.to_string()))?;
        let discarded = self.stop_channel(name, handle).await;
        Ok(discarded)
    }

    /// Replaces a channel's configuration in place. Pending work is kept.
    /// Returns the names of the fields that changed.
    pub async fn reconfigure_channel(
        &self,
        config: ChannelConfig,
    ) -> Result<Vec<String>, DispatchError> {
        let config = Arc::new(config.validated()?);
        let name = config.name.clone();

        let (previous, backend, commands) = {
            let mut channels = self.shared.channels.write();
            let handle = channels
                .get_mut(&name)
                .ok_or_else(|| DispatchError::UnknownChannel(name.clone()))?;
            let backend = if handle.config.channel_type == config.channel_type {
                handle.backend.clone()
            } else {
                self.backends
                    .get(config.channel_type)
                    .ok_or(DispatchError::MissingBackend(config.channel_type))?
            };
            let previous = std::mem::replace(&mut handle.config, config.clone());
            handle.backend = backend.clone();
            (previous, backend, handle.commands.clone())
        };

        let changed = previous.changed_fields(&config);
        if changed.is_empty() {
            return Ok(changed);
        }
        if commands
            .send(ChannelCommand::Reconfigure {
                config: config.clone(),
                backend,
            })
            .await
            .is_err()
        {
            warn!(channel = %name, "Channel worker gone before reconfiguration");
        }

        info!(channel = %name, fields = ?changed, "Channel configuration changed");
        self.shared
            .publish(ChannelConfigurationChanged::new(&name, changed.clone()));
        if previous.filter_differs(&config) {
            self.shared.publish(FilterConfigurationChanged::new(
                &name,
                config.is_enabled,
                config.minimum_severity,
                config.maximum_severity,
                config.allowed_tags.len(),
                config.ignored_sources.len(),
            ));
        }
        Ok(changed)
    }

    /// Routes `alert` to every channel whose filter accepts it. Waits only
    /// for the hand-off to each worker, never for delivery.
    #[instrument(name = "dispatch", skip_all, fields(alert_id = tracing::field::Empty))]
    pub async fn dispatch(&self, alert: Alert) -> Result<DispatchReport, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let alert = alert.normalized();
        tracing::Span::current().record("alert_id", alert.id.as_str());
        self.shared.metrics.alerts_dispatched.inc();
        self.shared.publish(AlertRaised::new(&alert));

        let mut report = DispatchReport {
            alert_id: alert.id.clone(),
            routed: Vec::new(),
            filtered: Vec::new(),
        };
        let mut accepted = Vec::new();
        for target in self.shared.targets(|_| true) {
            let name = target.config.name.as_str();
            target.stats.add_evaluated(1);
            if target.config.should_process_alert(&alert) {
                target.stats.add_passed(1);
                accepted.push(target);
            } else {
                target.stats.add_filtered(1);
                self.shared
                    .metrics
                    .alerts_filtered
                    .with_label_values(&[name])
                    .inc();
                report.filtered.push(name.to_string());
            }
        }

        // Escalations from any of these skip the others.
        let routed: Arc<[String]> = accepted
            .iter()
            .map(|target| target.config.name.clone())
            .collect();
        for target in accepted {
            let name = target.config.name.as_str();
            self.shared.alerts_entered(1);
            let command = ChannelCommand::Deliver {
                alert: alert.clone(),
                routed: routed.clone(),
            };
            match target.commands.send(command).await {
                Ok(()) => report.routed.push(name.to_string()),
                Err(_) => {
                    self.shared.alerts_settled(1);
                    debug!(channel = name, "Channel closed during dispatch");
                }
            }
        }
        debug!(
            routed = report.routed.len(),
            filtered = report.filtered.len(),
            "Alert dispatched"
        );
        Ok(report)
    }

    /// Sends every partially filled batch now.
    pub async fn flush(&self) {
        let mut acks = Vec::new();
        for target in self.shared.targets(|_| true) {
            let (ack, done) = oneshot::channel();
            if target.commands.send(ChannelCommand::Flush(ack)).await.is_ok() {
                acks.push(done);
            }
        }
        for done in acks {
            let _ = done.await;
        }
    }

    /// Resolves once no alert is batched, queued, in flight or awaiting a
    /// retry on any channel. Batches still wait for their flush interval.
    pub async fn wait_idle(&self) {
        loop {
            let targets = self.shared.targets(|_| true);
            if targets.is_empty() {
                return;
            }
            let mut acks = Vec::with_capacity(targets.len());
            for target in targets {
                let (ack, done) = oneshot::channel();
                if target.commands.send(ChannelCommand::WaitIdle(ack)).await.is_ok() {
                    acks.push(done);
                }
            }
            for done in acks {
                let _ = done.await;
            }
            // Escalations may have handed work to a channel that already answered.
            if self.shared.active_alerts() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Publishes a `FilterStatisticsUpdated` event per channel.
    pub fn publish_filter_statistics(&self) {
        for target in self.shared.targets(|_| true) {
            let stats = target.stats.snapshot();
            self.shared.publish(FilterStatisticsUpdated::new(
                &target.config.name,
                stats.evaluated,
                stats.passed,
                stats.filtered,
                stats.rate_limited(),
            ));
        }
    }

    /// Registered channel names in dispatch order.
    pub fn channel_names(&self) -> Vec<String> {
        self.shared
            .targets(|_| true)
            .into_iter()
            .map(|target| target.config.name.clone())
            .collect()
    }

    pub fn channel_config(&self, name: &str) -> Option<Arc<ChannelConfig>> {
        self.shared.channels.read().get(name).map(|h| h.config.clone())
    }

    pub fn channel_statistics(&self, name: &str) -> Option<ChannelStatisticsSnapshot> {
        self.shared.channels.read().get(name).map(|h| h.stats.snapshot())
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.shared.health.lock().snapshot()
    }

    /// Alert/channel pairs accepted and not yet delivered, failed or discarded.
    pub fn active_alert_count(&self) -> usize {
        self.shared.active_alerts()
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.shared.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Rejects further dispatches, stops every worker and discards pending
    /// alerts. Returns the total discarded.
    pub async fn shutdown(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let handles: Vec<(String, ChannelHandle)> = {
            let mut channels = self.shared.channels.write();
            std::mem::take(&mut *channels).into_iter().collect()
        };
        let mut discarded = 0;
        for (name, handle) in handles {
            discarded += self.stop_channel(&name, handle).await;
        }
        self.cancel.cancel();
        info!(discarded, "Dispatch engine shut down");
        discarded
    }

    async fn stop_channel(&self, name: &str, handle: ChannelHandle) -> usize {
        handle.cancel.cancel();
        let discarded = match handle.task.await {
            Ok(discarded) => discarded,
            Err(error) => {
                warn!(channel = name, "Channel worker ended abnormally: {error}");
                0
            }
        };

        let system = self
            .shared
            .health
            .lock()
            .unregister(name, self.shared.active_alerts());
        self.shared.metrics.forget_channel(name);
        info!(channel = name, discarded, "Channel unregistered");
        self.shared.publish(ChannelUnregistered::new(name, discarded));
        if let Some(system) = system {
            self.shared.metrics.system_health.set(system.current_ratio);
            self.shared.publish(system);
        }
        discarded
    }

    fn channel_rng(&self, name: &str) -> SmallRng {
        match self.shared.config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed ^ fnv1a(name.as_bytes())),
            None => SmallRng::from_rng(&mut rand::rng()),
        }
    }
}

impl Drop for AlertDispatchEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
