//! ## herold-reliability::rate_limit
//! **Token bucket with O(1) admission and a bounded FIFO for deferred alerts**
//!
//! The bucket starts full at `burst_capacity` and refills lazily at
//! `max_alerts_per_window / time_window` tokens per second. When empty the
//! configured [`ExceededAction`] decides what happens to the alert. For the
//! queue action the limiter owns the deferred items; callers drain them with
//! [`RateLimiter::release`] and [`RateLimiter::expire`] and use
//! [`RateLimiter::next_deadline`] to know when to look again.
//!
//! The limiter is not synchronized. Each channel worker owns exactly one.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use herold_config::{ExceededAction, RateLimitConfig};
use serde::Serialize;

/// Absorbs float error in lazy refill so a due token is never missed.
const TOKEN_EPSILON: f64 = 1e-9;

/// Token-only admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitResult {
    Allow,
    Queued,
    Dropped,
    Escalated,
}

/// Admission decision that carries the offered item back when the limiter
/// does not keep it.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    Allowed(T),
    /// The item now waits in the queue. `evicted` holds entries pushed out
    /// of a full queue, oldest first.
    Queued { evicted: Vec<T> },
    Dropped(T),
    Escalated(T),
}

impl<T> Admission<T> {
    pub fn result(&self) -> AdmitResult {
        match self {
            Admission::Allowed(_) => AdmitResult::Allow,
            Admission::Queued { .. } => AdmitResult::Queued,
            Admission::Dropped(_) => AdmitResult::Dropped,
            Admission::Escalated(_) => AdmitResult::Escalated,
        }
    }
}

/// Running totals since the limiter was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStatistics {
    pub allowed: u64,
    pub queued: u64,
    pub dropped: u64,
    pub escalated: u64,
    /// Queued entries pushed out by a full queue.
    pub evicted: u64,
    /// Queued entries that outlived `max_queue_delay`.
    pub expired: u64,
    /// Queued entries that later received a token.
    pub released: u64,
}

#[derive(Debug)]
struct QueuedEntry<T> {
    item: T,
    enqueued_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter<T> {
    config: RateLimitConfig,
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
    queue: VecDeque<QueuedEntry<T>>,
    stats: LimiterStatistics,
}

impl<T> RateLimiter<T> {
    pub fn new(config: RateLimitConfig, now: Instant) -> Self {
        let capacity = config.burst_capacity.max(1) as f64;
        let refill_per_sec = if config.time_window_ms == 0 {
            0.0
        } else {
            config.refill_rate()
        };
        Self {
            config,
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: now,
            queue: VecDeque::new(),
            stats: LimiterStatistics::default(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn statistics(&self) -> LimiterStatistics {
        self.stats
    }

    /// Number of items waiting for a token.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Tokens available at `now`, without consuming any.
    pub fn available_tokens(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }

    /// Decides for an item that is not handed over. Queue occupancy is
    /// consulted but never changed, so `Queued` means a slot exists.
    pub fn admit(&mut self, now: Instant) -> AdmitResult {
        if !self.config.is_enabled {
            self.stats.allowed += 1;
            return AdmitResult::Allow;
        }
        self.refill(now);
        if self.take_token() {
            self.stats.allowed += 1;
            return AdmitResult::Allow;
        }
        match self.config.exceeded_action {
            ExceededAction::Drop => {
                self.stats.dropped += 1;
                AdmitResult::Dropped
            }
            ExceededAction::Escalate => {
                self.stats.escalated += 1;
                AdmitResult::Escalated
            }
            ExceededAction::Queue if self.queue.len() < self.config.max_queue_size => {
                self.stats.queued += 1;
                AdmitResult::Queued
            }
            ExceededAction::Queue => {
                self.stats.dropped += 1;
                AdmitResult::Dropped
            }
        }
    }

    /// Decides for `item`. Queued items are kept until released, expired or
    /// drained. Call [`Self::expire`] and [`Self::release`] first so the queue
    /// head is never stale and freshly refilled tokens go to waiting items.
    pub fn offer(&mut self, item: T, now: Instant) -> Admission<T> {
        if !self.config.is_enabled {
            self.stats.allowed += 1;
            return Admission::Allowed(item);
        }
        self.refill(now);

        // FIFO: nothing overtakes a waiting item.
        if self.queue.is_empty() && self.take_token() {
            self.stats.allowed += 1;
            return Admission::Allowed(item);
        }

        match self.config.exceeded_action {
            ExceededAction::Drop => {
                self.stats.dropped += 1;
                Admission::Dropped(item)
            }
            ExceededAction::Escalate => {
                self.stats.escalated += 1;
                Admission::Escalated(item)
            }
            ExceededAction::Queue => {
                self.queue.push_back(QueuedEntry {
                    item,
                    enqueued_at: now,
                });
                self.stats.queued += 1;
                let mut evicted = Vec::new();
                while self.queue.len() > self.config.max_queue_size.max(1) {
                    if let Some(entry) = self.queue.pop_front() {
                        self.stats.evicted += 1;
                        evicted.push(entry.item);
                    }
                }
                Admission::Queued { evicted }
            }
        }
    }

    /// Pops queued items, oldest first, while tokens are available.
    pub fn release(&mut self, now: Instant) -> Vec<T> {
        let mut released = Vec::new();
        if self.queue.is_empty() {
            return released;
        }
        self.refill(now);
        while !self.queue.is_empty() && self.take_token() {
            if let Some(entry) = self.queue.pop_front() {
                self.stats.released += 1;
                released.push(entry.item);
            }
        }
        released
    }

    /// Removes queued items that have waited `max_queue_delay` or longer.
    pub fn expire(&mut self, now: Instant) -> Vec<T> {
        let max_delay = self.config.max_queue_delay();
        let mut expired = Vec::new();
        while self
            .queue
            .front()
            .is_some_and(|entry| now.saturating_duration_since(entry.enqueued_at) >= max_delay)
        {
            if let Some(entry) = self.queue.pop_front() {
                self.stats.expired += 1;
                expired.push(entry.item);
            }
        }
        expired
    }

    /// Earliest instant at which `release` or `expire` has work, if anything is queued.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let head = self.queue.front()?;
        let expiry = head.enqueued_at + self.config.max_queue_delay();
        let tokens = self.available_tokens(now);
        let refill = if tokens >= 1.0 - TOKEN_EPSILON {
            now
        } else if self.refill_per_sec > 0.0 {
            let wait_us = ((1.0 - tokens) / self.refill_per_sec * 1e6).ceil();
            now + Duration::from_micros(wait_us as u64)
        } else {
            expiry
        };
        Some(refill.min(expiry))
    }

    /// Empties the queue, returning its items oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.queue.drain(..).map(|entry| entry.item).collect()
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        self.tokens = self.available_tokens(now);
        self.last_refill = now;
    }

    fn take_token(&mut self) -> bool {
        if self.tokens >= 1.0 - TOKEN_EPSILON {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter<T>(
        max: u32,
        window_ms: u64,
        burst: u32,
        action: ExceededAction,
        now: Instant,
    ) -> RateLimiter<T> {
        RateLimiter::new(
            RateLimitConfig::per_window(max, Duration::from_millis(window_ms), burst, action),
            now,
        )
    }

    #[test]
    fn burst_then_refill() {
        let start = Instant::now();
        let mut limiter: RateLimiter<()> = limiter(5, 1_000, 5, ExceededAction::Drop, start);
        for _ in 0..5 {
            assert_eq!(limiter.admit(start), AdmitResult::Allow);
        }
        assert_ne!(limiter.admit(start), AdmitResult::Allow);

        let later = start + Duration::from_secs(1);
        assert!(limiter.available_tokens(later) >= 1.0);
        assert_eq!(limiter.admit(later), AdmitResult::Allow);
    }

    #[test]
    fn partial_refill_is_proportional() {
        let start = Instant::now();
        let mut limiter: RateLimiter<()> = limiter(10, 1_000, 10, ExceededAction::Drop, start);
        for _ in 0..10 {
            limiter.admit(start);
        }
        let tokens = limiter.available_tokens(start + Duration::from_millis(300));
        assert!((tokens - 3.0).abs() < 1e-9);
    }

    #[test]
    fn third_alert_is_dropped() {
        let now = Instant::now();
        let mut limiter = limiter(2, 1_000, 2, ExceededAction::Drop, now);
        assert_eq!(limiter.offer(1, now), Admission::Allowed(1));
        assert_eq!(limiter.offer(2, now), Admission::Allowed(2));
        assert_eq!(limiter.offer(3, now), Admission::Dropped(3));
        assert_eq!(limiter.statistics().dropped, 1);
        assert_eq!(limiter.statistics().allowed, 2);
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let now = Instant::now();
        let mut config =
            RateLimitConfig::per_window(1, Duration::from_secs(60), 1, ExceededAction::Drop);
        config.is_enabled = false;
        let mut limiter = RateLimiter::new(config, now);
        for n in 0..100 {
            assert_eq!(limiter.offer(n, now), Admission::Allowed(n));
        }
    }

    #[test]
    fn escalate_hands_item_back() {
        let now = Instant::now();
        let mut limiter = limiter(1, 1_000, 1, ExceededAction::Escalate, now);
        assert_eq!(limiter.offer("a", now).result(), AdmitResult::Allow);
        assert_eq!(limiter.offer("b", now), Admission::Escalated("b"));
    }

    #[test]
    fn queue_releases_in_order() {
        let start = Instant::now();
        let mut limiter = limiter(1, 1_000, 1, ExceededAction::Queue, start);
        assert_eq!(limiter.offer(1, start), Admission::Allowed(1));
        assert_eq!(limiter.offer(2, start), Admission::Queued { evicted: vec![] });
        assert_eq!(limiter.offer(3, start), Admission::Queued { evicted: vec![] });
        assert_eq!(limiter.pending(), 2);

        let deadline = limiter.next_deadline(start).expect("queued");
        assert_eq!(deadline, start + Duration::from_secs(1));

        assert!(limiter.release(start).is_empty());
        assert_eq!(limiter.release(start + Duration::from_secs(1)), vec![2]);
        assert_eq!(limiter.release(start + Duration::from_secs(2)), vec![3]);
        assert_eq!(limiter.next_deadline(start + Duration::from_secs(2)), None);
    }

    #[test]
    fn new_items_wait_behind_queue() {
        let start = Instant::now();
        let mut limiter = limiter(1, 1_000, 1, ExceededAction::Queue, start);
        limiter.offer(1, start);
        limiter.offer(2, start);
        // A token is available again, but item 2 is still waiting.
        let later = start + Duration::from_secs(1);
        assert!(matches!(limiter.offer(3, later), Admission::Queued { .. }));
        assert_eq!(limiter.release(later), vec![2]);
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let now = Instant::now();
        let mut config =
            RateLimitConfig::per_window(1, Duration::from_secs(60), 1, ExceededAction::Queue);
        config.max_queue_size = 2;
        let mut limiter = RateLimiter::new(config, now);
        limiter.offer(0, now);
        limiter.offer(1, now);
        limiter.offer(2, now);
        assert_eq!(limiter.offer(3, now), Admission::Queued { evicted: vec![1] });
        assert_eq!(limiter.drain(), vec![2, 3]);
        assert_eq!(limiter.statistics().evicted, 1);
    }

    #[test]
    fn stale_entries_expire() {
        let start = Instant::now();
        let mut config =
            RateLimitConfig::per_window(1, Duration::from_secs(3_600), 1, ExceededAction::Queue);
        config.max_queue_delay_ms = 500;
        let mut limiter = RateLimiter::new(config, start);
        limiter.offer("first", start);
        limiter.offer("second", start);
        limiter.offer("third", start + Duration::from_millis(200));

        assert_eq!(
            limiter.next_deadline(start),
            Some(start + Duration::from_millis(500))
        );
        assert!(limiter.expire(start + Duration::from_millis(499)).is_empty());
        assert_eq!(limiter.expire(start + Duration::from_millis(500)), vec!["second"]);
        assert_eq!(limiter.expire(start + Duration::from_millis(700)), vec!["third"]);
        assert_eq!(limiter.statistics().expired, 2);
    }

    #[test]
    fn admit_reports_queue_room() {
        let now = Instant::now();
        let mut config =
            RateLimitConfig::per_window(1, Duration::from_secs(60), 1, ExceededAction::Queue);
        config.max_queue_size = 1;
        let mut limiter: RateLimiter<u8> = RateLimiter::new(config, now);
        assert_eq!(limiter.admit(now), AdmitResult::Allow);
        assert_eq!(limiter.admit(now), AdmitResult::Queued);
        limiter.offer(9, now);
        assert_eq!(limiter.admit(now), AdmitResult::Dropped);
    }
}
