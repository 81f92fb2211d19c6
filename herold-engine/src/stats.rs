//! Lock-free per-channel counters, readable while the worker runs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ChannelStatistics {
    evaluated: AtomicU64,
    passed: AtomicU64,
    filtered: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    queued: AtomicU64,
    escalated: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`ChannelStatistics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatisticsSnapshot {
    pub evaluated: u64,
    pub passed: u64,
    pub filtered: u64,
    pub delivered: u64,
    pub failed: u64,
    pub attempts: u64,
    pub retried: u64,
    pub dropped: u64,
    pub queued: u64,
    pub escalated: u64,
    pub expired: u64,
    pub evicted: u64,
    pub discarded: u64,
}

impl ChannelStatisticsSnapshot {
    /// Alerts the rate limiter did not admit straight away.
    pub fn rate_limited(&self) -> u64 {
        self.dropped + self.queued + self.escalated
    }
}

macro_rules! counters {
    ($($field:ident => $method:ident),* $(,)?) => {
        impl ChannelStatistics {
            $(
                pub fn $method(&self, n: u64) {
                    self.$field.fetch_add(n, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> ChannelStatisticsSnapshot {
                ChannelStatisticsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    evaluated => add_evaluated,
    passed => add_passed,
    filtered => add_filtered,
    delivered => add_delivered,
    failed => add_failed,
    attempts => add_attempts,
    retried => add_retried,
    dropped => add_dropped,
    queued => add_queued,
    escalated => add_escalated,
    expired => add_expired,
    evicted => add_evicted,
    discarded => add_discarded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = ChannelStatistics::default();
        stats.add_evaluated(3);
        stats.add_passed(2);
        stats.add_filtered(1);
        stats.add_dropped(1);
        stats.add_queued(2);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evaluated, 3);
        assert_eq!(snapshot.rate_limited(), 3);
    }
}
