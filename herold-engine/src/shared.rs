//! State shared between the engine facade and its channel workers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use herold_config::{ChannelConfig, DispatchConfig};
use herold_core::events::{AlertEvent, AlertSuppressed, SuppressionReason};
use herold_core::Alert;
use herold_telemetry::MetricsRecorder;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::DeliveryBackend;
use crate::health::ChannelHealthTracker;
use crate::sink::EventSink;
use crate::stats::ChannelStatistics;
use crate::worker::ChannelCommand;

/// Registry entry for a live channel.
pub(crate) struct ChannelHandle {
    pub(crate) config: Arc<ChannelConfig>,
    pub(crate) backend: Arc<dyn DeliveryBackend>,
    pub(crate) commands: mpsc::Sender<ChannelCommand>,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<usize>,
    pub(crate) stats: Arc<ChannelStatistics>,
}

/// What a dispatcher needs from a channel, copied out of the registry so no
/// lock is held while sending.
#[derive(Clone)]
pub(crate) struct ChannelTarget {
    pub(crate) config: Arc<ChannelConfig>,
    pub(crate) commands: mpsc::Sender<ChannelCommand>,
    pub(crate) stats: Arc<ChannelStatistics>,
}

impl From<&ChannelHandle> for ChannelTarget {
    fn from(handle: &ChannelHandle) -> Self {
        Self {
            config: handle.config.clone(),
            commands: handle.commands.clone(),
            stats: handle.stats.clone(),
        }
    }
}

pub(crate) struct EngineShared {
    pub(crate) config: DispatchConfig,
    pub(crate) channels: RwLock<BTreeMap<String, ChannelHandle>>,
    pub(crate) health: Mutex<ChannelHealthTracker>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) metrics: Arc<MetricsRecorder>,
    active_alerts: AtomicUsize,
}

impl EngineShared {
    pub(crate) fn new(
        config: DispatchConfig,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            health: Mutex::new(ChannelHealthTracker::new(config.health_failure_threshold)),
            config,
            channels: RwLock::new(BTreeMap::new()),
            sink,
            metrics,
            active_alerts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn publish(&self, event: impl Into<AlertEvent>) {
        self.sink.publish(event.into());
    }

    /// Channels in dispatch order, optionally restricted by `filter`.
    pub(crate) fn targets(&self, filter: impl Fn(&ChannelConfig) -> bool) -> Vec<ChannelTarget> {
        let mut targets: Vec<ChannelTarget> = self
            .channels
            .read()
            .values()
            .filter(|handle| filter(&handle.config))
            .map(ChannelTarget::from)
            .collect();
        targets.sort_by(|a, b| a.config.dispatch_order(&b.config));
        targets
    }

    /// Alert/channel pairs the engine has accepted and not yet finished with.
    pub(crate) fn active_alerts(&self) -> usize {
        self.active_alerts.load(Ordering::Acquire)
    }

    pub(crate) fn alerts_entered(&self, n: usize) {
        self.active_alerts.fetch_add(n, Ordering::AcqRel);
    }

    pub(crate) fn alerts_settled(&self, n: usize) {
        let _ = self
            .active_alerts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                Some(active.saturating_sub(n))
            });
    }

    /// Records one delivery attempt and publishes any resulting health change.
    pub(crate) fn record_health(&self, channel: &str, success: bool, reason: Option<&str>) {
        let update = self
            .health
            .lock()
            .record_result(channel, success, reason, self.active_alerts());

        if let Some(changed) = update.channel {
            self.metrics.set_channel_health(channel, changed.current_healthy);
            if changed.current_healthy {
                info!(channel = channel, "Channel recovered");
            } else {
                warn!(
                    channel = channel,
                    failures = changed.consecutive_failures,
                    "Channel marked unhealthy"
                );
            }
            self.publish(changed);
        }
        if let Some(system) = update.system {
            self.metrics.system_health.set(system.current_ratio);
            self.publish(system);
        }
    }

    /// Forwards `alert` to every enabled emergency channel other than
    /// `source`, bypassing their filters and rate limiters. Channels named in
    /// `routed` already took the alert from the same dispatch and are skipped.
    pub(crate) fn escalate(&self, source: &str, alert: &Alert, routed: &[String]) -> Escalation {
        let targets = self.targets(|config| {
            config.is_emergency_channel && config.is_enabled && config.name != source
        });
        let mut outcome = Escalation::default();
        for target in targets {
            let name = target.config.name.as_str();
            if routed.iter().any(|other| other == name) {
                outcome.already_routed += 1;
                continue;
            }
            self.alerts_entered(1);
            match target.commands.try_send(ChannelCommand::Escalated(alert.clone())) {
                Ok(()) => outcome.accepted += 1,
                Err(error) => {
                    self.alerts_settled(1);
                    outcome.unavailable += 1;
                    warn!(
                        channel = name,
                        alert_id = %alert.id,
                        "Escalation target unavailable: {error}"
                    );
                    self.publish(AlertSuppressed::new(
                        alert,
                        name,
                        SuppressionReason::EscalationTargetUnavailable,
                    ));
                }
            }
        }
        outcome
    }
}

/// Where an escalated alert ended up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Escalation {
    pub(crate) accepted: usize,
    pub(crate) already_routed: usize,
    /// Targets whose command queue was full or closed.
    pub(crate) unavailable: usize,
}

impl Escalation {
    /// Some emergency channel has the alert, now or from the original dispatch.
    pub(crate) fn reached_any(&self) -> bool {
        self.accepted + self.already_routed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LogBackend;
    use crate::sink::MemorySink;
    use herold_core::{ChannelType, Severity};

    fn shared(sink: Arc<MemorySink>) -> EngineShared {
        let metrics = MetricsRecorder::new("herold_shared_test").unwrap();
        EngineShared::new(DispatchConfig::default(), sink, Arc::new(metrics))
    }

    fn insert(
        shared: &EngineShared,
        config: ChannelConfig,
        capacity: usize,
    ) -> mpsc::Receiver<ChannelCommand> {
        let (commands, receiver) = mpsc::channel(capacity);
        shared.channels.write().insert(
            config.name.clone(),
            ChannelHandle {
                config: Arc::new(config),
                backend: Arc::new(LogBackend),
                commands,
                cancel: CancellationToken::new(),
                task: tokio::spawn(async { 0 }),
                stats: Arc::new(ChannelStatistics::default()),
            },
        );
        receiver
    }

    fn emergency(name: &str) -> ChannelConfig {
        ChannelConfig::create_emergency_channel(name, ChannelType::Custom).unwrap()
    }

    #[tokio::test]
    async fn escalation_skips_channels_that_already_routed_the_alert() {
        let sink = Arc::new(MemorySink::new());
        let shared = shared(sink.clone());
        let mut pager = insert(&shared, emergency("pager"), 8);
        let mut siren = insert(&shared, emergency("siren"), 8);
        let alert = Alert::new("queue backlog", Severity::Warning, "broker");

        let outcome = shared.escalate("mail", &alert, &["pager".to_string()]);

        assert_eq!(
            outcome,
            Escalation {
                accepted: 1,
                already_routed: 1,
                unavailable: 0,
            }
        );
        assert!(outcome.reached_any());
        assert!(pager.try_recv().is_err());
        // Below the siren's minimum severity, delivered anyway.
        assert!(matches!(
            siren.try_recv(),
            Ok(ChannelCommand::Escalated(escalated)) if escalated.id == alert.id
        ));
        assert_eq!(shared.active_alerts(), 1);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn full_emergency_queue_is_reported_as_unavailable() {
        let sink = Arc::new(MemorySink::new());
        let shared = shared(sink.clone());
        let _pager = insert(&shared, emergency("pager"), 1);
        let (ack, _) = tokio::sync::oneshot::channel();
        let target = shared.targets(|_| true).remove(0);
        target.commands.try_send(ChannelCommand::Flush(ack)).unwrap();
        let alert = Alert::new("db down", Severity::Critical, "db");

        let outcome = shared.escalate("mail", &alert, &[]);

        assert_eq!(outcome.unavailable, 1);
        assert!(!outcome.reached_any());
        assert_eq!(shared.active_alerts(), 0);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AlertEvent::AlertSuppressed(s)
                if s.channel == "pager"
                    && s.alert_id == alert.id
                    && s.reason == SuppressionReason::EscalationTargetUnavailable
        ));
    }

    #[tokio::test]
    async fn disabled_emergency_channel_is_not_a_target() {
        let shared = shared(Arc::new(MemorySink::new()));
        let config = ChannelConfig::builder("pager", ChannelType::Custom)
            .emergency(true)
            .enabled(false)
            .build()
            .unwrap();
        let _pager = insert(&shared, config, 8);
        let alert = Alert::new("db down", Severity::Critical, "db");

        assert_eq!(shared.escalate("mail", &alert, &[]), Escalation::default());
    }
}
