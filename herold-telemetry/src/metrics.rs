//! ## herold-telemetry::metrics
//! **Prometheus counters, latency histogram and health gauges per channel**

use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};

const CHANNEL: &[&str] = &["channel"];

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub alerts_dispatched: IntCounter,
    pub alerts_filtered: IntCounterVec,
    pub alerts_delivered: IntCounterVec,
    pub alerts_failed: IntCounterVec,
    pub alerts_dropped: IntCounterVec,
    pub alerts_queued: IntCounterVec,
    pub alerts_escalated: IntCounterVec,
    pub delivery_retries: IntCounterVec,
    pub delivery_latency: HistogramVec,
    pub channel_health: IntGaugeVec,
    pub system_health: Gauge,
}

impl MetricsRecorder {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let counter = IntCounterVec::new(Opts::new(name, help).namespace(namespace), CHANNEL)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let alerts_filtered =
            counter("alerts_filtered_total", "Alerts rejected by a channel filter")?;
        let alerts_delivered = counter("alerts_delivered_total", "Alerts delivered by a channel")?;
        let alerts_failed = counter("alerts_failed_total", "Alerts whose delivery finally failed")?;
        let alerts_dropped = counter("alerts_dropped_total", "Alerts dropped by the rate limiter")?;
        let alerts_queued = counter("alerts_queued_total", "Alerts deferred by the rate limiter")?;
        let alerts_escalated =
            counter("alerts_escalated_total", "Alerts escalated by the rate limiter")?;
        let delivery_retries = counter("delivery_retries_total", "Scheduled delivery retries")?;

        let alerts_dispatched = IntCounter::with_opts(
            Opts::new("alerts_dispatched_total", "Alerts handed to the dispatch engine")
                .namespace(namespace),
        )?;
        registry.register(Box::new(alerts_dispatched.clone()))?;

        let delivery_latency = HistogramVec::new(
            HistogramOpts::new("delivery_latency_seconds", "Duration of a single delivery attempt")
                .namespace(namespace)
                .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0]),
            CHANNEL,
        )?;
        registry.register(Box::new(delivery_latency.clone()))?;

        let channel_health = IntGaugeVec::new(
            Opts::new("channel_healthy", "1 when the channel is healthy").namespace(namespace),
            CHANNEL,
        )?;
        registry.register(Box::new(channel_health.clone()))?;

        let system_health = Gauge::with_opts(
            Opts::new(
                "system_health_ratio",
                "Healthy channels over registered channels",
            )
            .namespace(namespace),
        )?;
        registry.register(Box::new(system_health.clone()))?;

        Ok(Self {
            registry,
            alerts_dispatched,
            alerts_filtered,
            alerts_delivered,
            alerts_failed,
            alerts_dropped,
            alerts_queued,
            alerts_escalated,
            delivery_retries,
            delivery_latency,
            channel_health,
            system_health,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn set_channel_health(&self, channel: &str, healthy: bool) {
        self.channel_health
            .with_label_values(&[channel])
            .set(i64::from(healthy));
    }

    pub fn observe_delivery(&self, channel: &str, seconds: f64) {
        self.delivery_latency
            .with_label_values(&[channel])
            .observe(seconds);
    }

    /// Drops every per-channel series for `channel`.
    pub fn forget_channel(&self, channel: &str) {
        let labels = [channel];
        for counter in [
            &self.alerts_filtered,
            &self.alerts_delivered,
            &self.alerts_failed,
            &self.alerts_dropped,
            &self.alerts_queued,
            &self.alerts_escalated,
            &self.delivery_retries,
        ] {
            let _ = counter.remove_label_values(&labels);
        }
        let _ = self.delivery_latency.remove_label_values(&labels);
        let _ = self.channel_health.remove_label_values(&labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_channel_series() {
        let metrics = MetricsRecorder::new("herold").unwrap();
        metrics.alerts_dispatched.inc();
        metrics.alerts_delivered.with_label_values(&["ops-log"]).inc();
        metrics.set_channel_health("ops-log", false);
        metrics.observe_delivery("ops-log", 0.02);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("herold_alerts_dispatched_total 1"));
        assert!(text.contains(r#"herold_alerts_delivered_total{channel="ops-log"} 1"#));
        assert!(text.contains(r#"herold_channel_healthy{channel="ops-log"} 0"#));

        metrics.forget_channel("ops-log");
        let text = metrics.gather_metrics().unwrap();
        assert!(!text.contains(r#"channel="ops-log""#));
    }

    #[test]
    fn separate_registries_do_not_collide() {
        assert!(MetricsRecorder::new("a").is_ok());
        assert!(MetricsRecorder::new("a").is_ok());
    }
}
