//! Per-channel worker task.
//!
//! Each registered channel is served by one task that exclusively owns the
//! channel's mutable state: rate limiter, batch buffer, retry timers and
//! jitter RNG. Commands arrive over an mpsc queue in dispatch order. At most
//! one job is outstanding per channel, whether in flight or backing off, so
//! deliveries complete in arrival order. Backoff and batch intervals are
//! timers polled by the worker's select loop, never sleeps inside a send.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use herold_config::ChannelConfig;
use herold_core::events::{
    AlertDelivered, AlertDeliveryFailed, AlertSuppressed, SuppressionReason,
};
use herold_core::Alert;
use herold_reliability::{Admission, RateLimiter, RetryPolicy};
use rand::rngs::SmallRng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};

use crate::backend::{DeliveryBackend, DeliveryRequest};
use crate::error::DeliveryError;
use crate::format::format_batch;
use crate::shared::EngineShared;
use crate::stats::ChannelStatistics;

pub(crate) enum ChannelCommand {
    /// Alert that passed this channel's filter, with every channel the same
    /// dispatch routed it to.
    Deliver { alert: Alert, routed: Arc<[String]> },
    /// Alert escalated from another channel; skips the rate limiter.
    Escalated(Alert),
    Reconfigure {
        config: Arc<ChannelConfig>,
        backend: Arc<dyn DeliveryBackend>,
    },
    /// Send the partial batch now.
    Flush(oneshot::Sender<()>),
    /// Answer once nothing is batched, queued, in flight or awaiting retry.
    WaitIdle(oneshot::Sender<()>),
}

struct DeliveryJob {
    alerts: Vec<Alert>,
    message: String,
    /// Attempts made so far.
    attempts: u32,
}

type SendOutcome = (Result<(), DeliveryError>, Duration);
type JobOutcome = (DeliveryJob, Result<(), DeliveryError>, Duration);

struct InFlight {
    job: DeliveryJob,
    handle: JoinHandle<SendOutcome>,
}

pub(crate) struct ChannelWorker {
    config: Arc<ChannelConfig>,
    backend: Arc<dyn DeliveryBackend>,
    retry: RetryPolicy,
    limiter: RateLimiter<Alert>,
    rng: SmallRng,
    batch: Vec<Alert>,
    batch_deadline: Option<Instant>,
    ready: VecDeque<DeliveryJob>,
    in_flight: Option<InFlight>,
    /// Job backing off before its next attempt. Later jobs wait behind it.
    retrying: Option<DeliveryJob>,
    timers: JoinSet<()>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    commands: mpsc::Receiver<ChannelCommand>,
    cancel: CancellationToken,
    shared: Arc<EngineShared>,
    stats: Arc<ChannelStatistics>,
}

impl ChannelWorker {
    pub(crate) fn new(
        config: Arc<ChannelConfig>,
        backend: Arc<dyn DeliveryBackend>,
        commands: mpsc::Receiver<ChannelCommand>,
        cancel: CancellationToken,
        shared: Arc<EngineShared>,
        stats: Arc<ChannelStatistics>,
        rng: SmallRng,
    ) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry_policy.clone()),
            limiter: RateLimiter::new(config.rate_limit.clone(), std_now()),
            config,
            backend,
            rng,
            batch: Vec::new(),
            batch_deadline: None,
            ready: VecDeque::new(),
            in_flight: None,
            retrying: None,
            timers: JoinSet::new(),
            idle_waiters: Vec::new(),
            commands,
            cancel,
            shared,
            stats,
        }
    }

    /// Serves the channel until cancelled. Returns the number of discarded alerts.
    #[instrument(name = "channel_worker", skip_all, fields(channel = %self.config.name))]
    pub(crate) async fn run(mut self) -> usize {
        debug!("Channel worker started");
        loop {
            self.notify_idle();
            let batch_deadline = self.batch_deadline;
            let queue_deadline = self
                .limiter
                .next_deadline(std_now())
                .map(Instant::from_std);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                outcome = join_in_flight(&mut self.in_flight) => self.handle_outcome(outcome),
                Some(fired) = self.timers.join_next(), if !self.timers.is_empty() => {
                    self.handle_timer(fired)
                }
                _ = sleep_until_opt(batch_deadline) => self.flush_batch(),
                _ = sleep_until_opt(queue_deadline) => self.service_queue(std_now()),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        self.discard_pending()
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Deliver { alert, routed } => self.admit(alert, &routed),
            ChannelCommand::Escalated(alert) => {
                debug!(alert_id = %alert.id, "Escalated alert received");
                self.enqueue(alert);
            }
            ChannelCommand::Reconfigure { config, backend } => self.reconfigure(config, backend),
            ChannelCommand::Flush(ack) => {
                self.flush_batch();
                let _ = ack.send(());
            }
            ChannelCommand::WaitIdle(ack) => self.idle_waiters.push(ack),
        }
    }

    fn admit(&mut self, alert: Alert, routed: &[String]) {
        let now = std_now();
        self.service_queue(now);
        let name = self.config.name.as_str();
        let metrics = &self.shared.metrics;

        match self.limiter.offer(alert, now) {
            Admission::Allowed(alert) => self.enqueue(alert),
            Admission::Queued { evicted } => {
                self.stats.add_queued(1);
                metrics.alerts_queued.with_label_values(&[name]).inc();
                if !evicted.is_empty() {
                    self.stats.add_evicted(evicted.len() as u64);
                    let error =
                        DeliveryError::QueueOverflow(self.config.rate_limit.max_queue_size);
                    self.fail_final(&evicted, &error, 0);
                }
            }
            Admission::Dropped(alert) => {
                self.stats.add_dropped(1);
                metrics.alerts_dropped.with_label_values(&[name]).inc();
                debug!(alert_id = %alert.id, "Alert dropped by rate limiter");
                self.shared
                    .publish(AlertSuppressed::new(&alert, name, SuppressionReason::RateLimited));
                self.shared.alerts_settled(1);
            }
            Admission::Escalated(alert) => {
                self.stats.add_escalated(1);
                metrics.alerts_escalated.with_label_values(&[name]).inc();
                let escalation = self.shared.escalate(name, &alert, routed);
                if escalation.reached_any() {
                    debug!(
                        alert_id = %alert.id,
                        accepted = escalation.accepted,
                        already_routed = escalation.already_routed,
                        "Alert escalated"
                    );
                } else if escalation.unavailable == 0 {
                    warn!(
                        alert_id = %alert.id,
                        "Escalation requested but no emergency channel is registered"
                    );
                    self.shared.publish(AlertSuppressed::new(
                        &alert,
                        name,
                        SuppressionReason::NoEmergencyChannel,
                    ));
                }
                self.shared.alerts_settled(1);
            }
        }
    }

    fn enqueue(&mut self, alert: Alert) {
        if !self.config.enable_batching {
            self.push_job(vec![alert]);
            return;
        }
        if self.batch.is_empty() {
            self.batch_deadline = Some(Instant::now() + self.config.batch_flush_interval());
        }
        self.batch.push(alert);
        if self.batch.len() >= self.config.batch_size {
            self.flush_batch();
        }
    }

    fn flush_batch(&mut self) {
        self.batch_deadline = None;
        if self.batch.is_empty() {
            return;
        }
        let alerts = std::mem::take(&mut self.batch);
        debug!(size = alerts.len(), "Flushing batch");
        self.push_job(alerts);
    }

    fn push_job(&mut self, alerts: Vec<Alert>) {
        let message = format_batch(&self.config, &alerts);
        self.ready.push_back(DeliveryJob {
            alerts,
            message,
            attempts: 0,
        });
        self.start_next();
    }

    fn start_next(&mut self) {
        if self.in_flight.is_some() || self.retrying.is_some() {
            return;
        }
        let Some(job) = self.ready.pop_front() else {
            return;
        };

        let attempt = job.attempts + 1;
        let request = DeliveryRequest {
            channel: self.config.clone(),
            message: job.message.clone(),
            alerts: job.alerts.clone(),
            attempt,
        };
        let backend = self.backend.clone();
        let send_timeout = self.config.send_timeout();
        let handle = tokio::spawn(
            async move {
                let started = Instant::now();
                let result = timeout(send_timeout, backend.send(&request))
                    .await
                    .unwrap_or(Err(DeliveryError::Timeout(send_timeout)));
                (result, started.elapsed())
            }
            .instrument(debug_span!("deliver", attempt)),
        );
        self.in_flight = Some(InFlight { job, handle });
    }

    fn handle_outcome(&mut self, (mut job, result, elapsed): JobOutcome) {
        job.attempts += 1;
        let name = self.config.name.clone();
        let count = job.alerts.len();
        self.stats.add_attempts(1);
        self.shared.metrics.observe_delivery(&name, elapsed.as_secs_f64());

        match result {
            Ok(()) => {
                self.stats.add_delivered(count as u64);
                self.shared
                    .metrics
                    .alerts_delivered
                    .with_label_values(&[&name])
                    .inc_by(count as u64);
                for alert in &job.alerts {
                    self.shared
                        .publish(AlertDelivered::new(alert, &name, job.attempts, count));
                }
                debug!(attempts = job.attempts, size = count, "Delivered");
                self.record_health(true, None);
                self.shared.alerts_settled(count);
            }
            Err(error) => {
                let reason = error.to_string();
                if error.is_retryable() && self.retry.should_retry(job.attempts) {
                    let delay = self.retry.compute_delay(job.attempts, &mut self.rng);
                    for alert in &job.alerts {
                        self.shared.publish(AlertDeliveryFailed::new(
                            alert,
                            &name,
                            error.kind().as_str(),
                            &reason,
                            job.attempts,
                            false,
                        ));
                    }
                    self.stats.add_retried(1);
                    self.shared
                        .metrics
                        .delivery_retries
                        .with_label_values(&[&name])
                        .inc();
                    debug!(
                        attempt = job.attempts,
                        ?delay,
                        error = %reason,
                        "Delivery failed, retry scheduled"
                    );
                    self.record_health(false, Some(&reason));
                    self.schedule_retry(job, delay);
                } else {
                    warn!(attempts = job.attempts, error = %reason, "Delivery failed");
                    self.fail_final(&job.alerts, &error, job.attempts);
                    self.record_health(false, Some(&reason));
                }
            }
        }
        self.start_next();
    }

    fn schedule_retry(&mut self, job: DeliveryJob, delay: Duration) {
        self.retrying = Some(job);
        self.timers.spawn(sleep(delay));
    }

    /// The backed-off job goes back to the head of the line.
    fn handle_timer(&mut self, fired: Result<(), JoinError>) {
        if let Err(error) = fired {
            warn!("Retry timer failed: {error}");
        }
        if let Some(job) = self.retrying.take() {
            self.ready.push_front(job);
        }
        self.start_next();
    }

    /// Expires stale queue entries, then hands queued alerts any refilled tokens.
    fn service_queue(&mut self, now: std::time::Instant) {
        let expired = self.limiter.expire(now);
        if !expired.is_empty() {
            self.stats.add_expired(expired.len() as u64);
            let error = DeliveryError::QueueTimeout(self.config.rate_limit.max_queue_delay());
            self.fail_final(&expired, &error, 0);
        }
        for alert in self.limiter.release(now) {
            self.enqueue(alert);
        }
    }

    fn fail_final(&self, alerts: &[Alert], error: &DeliveryError, attempts: u32) {
        let name = self.config.name.as_str();
        let reason = error.to_string();
        for alert in alerts {
            self.shared.publish(AlertDeliveryFailed::new(
                alert,
                name,
                error.kind().as_str(),
                &reason,
                attempts,
                true,
            ));
        }
        self.stats.add_failed(alerts.len() as u64);
        self.shared
            .metrics
            .alerts_failed
            .with_label_values(&[name])
            .inc_by(alerts.len() as u64);
        self.shared.alerts_settled(alerts.len());
    }

    fn record_health(&self, success: bool, reason: Option<&str>) {
        if self.config.enable_health_monitoring {
            self.shared.record_health(&self.config.name, success, reason);
        }
    }

    fn reconfigure(&mut self, config: Arc<ChannelConfig>, backend: Arc<dyn DeliveryBackend>) {
        let previous = std::mem::replace(&mut self.config, config);
        self.backend = backend;

        if previous.retry_policy != self.config.retry_policy {
            self.retry = RetryPolicy::new(self.config.retry_policy.clone());
        }
        if previous.rate_limit != self.config.rate_limit {
            let pending = self.limiter.drain();
            self.limiter = RateLimiter::new(self.config.rate_limit.clone(), std_now());
            for alert in pending {
                self.admit(alert, &[]);
            }
        }
        if !self.config.enable_batching || self.batch.len() >= self.config.batch_size {
            self.flush_batch();
        } else if let Some(deadline) = self.batch_deadline {
            let latest = Instant::now() + self.config.batch_flush_interval();
            self.batch_deadline = Some(deadline.min(latest));
        }
        info!("Channel reconfigured");
    }

    fn is_idle(&self) -> bool {
        self.batch.is_empty()
            && self.ready.is_empty()
            && self.in_flight.is_none()
            && self.retrying.is_none()
            && self.limiter.pending() == 0
    }

    fn notify_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_idle() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Drops all pending work. In-flight sends are detached and their results ignored.
    fn discard_pending(mut self) -> usize {
        self.commands.close();
        self.timers.abort_all();

        let mut discarded: Vec<Alert> = std::mem::take(&mut self.batch);
        for job in self.ready.drain(..) {
            discarded.extend(job.alerts);
        }
        if let Some(job) = self.retrying.take() {
            discarded.extend(job.alerts);
        }
        discarded.extend(self.limiter.drain());
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ChannelCommand::Deliver { alert, .. } | ChannelCommand::Escalated(alert) => {
                    discarded.push(alert)
                }
                ChannelCommand::Flush(ack) | ChannelCommand::WaitIdle(ack) => {
                    let _ = ack.send(());
                }
                ChannelCommand::Reconfigure { .. } => {}
            }
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }

        if let Some(in_flight) = self.in_flight.take() {
            self.shared.alerts_settled(in_flight.job.alerts.len());
        }

        let name = self.config.name.as_str();
        for alert in &discarded {
            self.shared.publish(AlertSuppressed::new(
                alert,
                name,
                SuppressionReason::ChannelUnregistered,
            ));
        }
        self.stats.add_discarded(discarded.len() as u64);
        self.shared.alerts_settled(discarded.len());
        info!(discarded = discarded.len(), "Channel worker stopped");
        discarded.len()
    }
}

/// Resolves when the in-flight send finishes; pending forever when there is none.
async fn join_in_flight(slot: &mut Option<InFlight>) -> JobOutcome {
    let Some(in_flight) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let (result, elapsed) = match (&mut in_flight.handle).await {
        Ok(outcome) => outcome,
        Err(error) => (Err(classify_join_error(error)), Duration::ZERO),
    };
    match slot.take() {
        Some(InFlight { job, .. }) => (job, result, elapsed),
        None => std::future::pending().await,
    }
}

fn classify_join_error(error: JoinError) -> DeliveryError {
    if !error.is_panic() {
        return DeliveryError::Transport(error.to_string());
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DeliveryError::Panic(message)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn std_now() -> std::time::Instant {
    Instant::now().into_std()
}
