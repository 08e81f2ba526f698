//! Per-key token buckets.
//!
//! Each key owns a bucket that holds at most `capacity` tokens and refills
//! continuously at `refill_per_sec`. A call refills the bucket for the time
//! elapsed since it was last touched, then spends one token if at least one is
//! available.
//!
//! Buckets live in a [`DashMap`]; the refill-and-spend sequence for a key runs
//! while holding that key's entry, so concurrent callers never push a bucket
//! below zero or above capacity.
//!
//! A bucket that has been idle long enough to refill completely is
//! indistinguishable from a new one, so [`TokenBucketLimiter::sweep_idle`]
//! drops those without changing any decision.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default bound on tracked keys before an inline sweep runs.
pub const DEFAULT_MAX_KEYS: usize = 100_000;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, capacity: f64, refill_per_sec: f64) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
            self.last_refill = now;
        }
    }
}

/// Outcome of a limiter call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    /// A token was spent.
    Allowed {
        /// Whole tokens left in the bucket.
        remaining: u64,
    },
    /// The bucket is empty.
    Limited {
        /// Time until one token is available.
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Returns `true` for [`RateDecision::Allowed`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// A table of token buckets keyed by client.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    buckets: DashMap<String, Bucket>,
    capacity: f64,
    refill_per_sec: f64,
    max_keys: usize,
}

impl TokenBucketLimiter {
    /// Burst and sustained rate both equal to `requests_per_second`.
    ///
    /// A client sending exactly `requests_per_second` requests per second is
    /// never throttled.
    #[must_use]
    pub fn per_second(requests_per_second: u32) -> Self {
        let rate = f64::from(requests_per_second.max(1));
        Self::new(rate, rate)
    }

    /// Separate burst capacity and refill rate. Both are clamped to at least 1.
    #[must_use]
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: capacity.max(1.0),
            refill_per_sec: refill_per_sec.max(f64::MIN_POSITIVE),
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    /// Number of tracked keys that triggers an inline sweep.
    #[must_use]
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    /// Bucket capacity.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Spends a token for `key` now.
    pub fn allow(&self, key: &str) -> RateDecision {
        self.allow_at(key, Instant::now())
    }

    /// Spends a token for `key` at `now`.
    pub fn allow_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.buckets.len() >= self.max_keys && !self.buckets.contains_key(key) {
            let evicted = self.sweep_idle(now);
            tracing::debug!(evicted, "rate limiter table full, swept idle buckets");
        }

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.capacity,
                last_refill: now,
            });
        bucket.refill(now, self.capacity, self.refill_per_sec);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::Allowed {
                remaining: remaining_tokens(bucket.tokens),
            }
        } else {
            let deficit = 1.0 - bucket.tokens;
            RateDecision::Limited {
                retry_after: Duration::from_secs_f64(deficit / self.refill_per_sec),
            }
        }
    }

    /// Tokens currently held for `key`, without refilling.
    #[must_use]
    pub fn available(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|b| b.tokens)
    }

    /// Drops buckets untouched for at least a full refill period.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let idle_after = self.idle_after();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle_after);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Time for an empty bucket to refill completely.
    #[must_use]
    pub fn idle_after(&self) -> Duration {
        Duration::from_secs_f64(self.capacity / self.refill_per_sec)
    }

    /// Spawns a task that sweeps idle buckets every `period`.
    ///
    /// The task ends on its own once the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let evicted = limiter.sweep_idle(Instant::now());
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = limiter.len(), "swept idle rate-limit buckets");
                }
            }
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn remaining_tokens(tokens: f64) -> u64 {
    tokens.max(0.0).floor() as u64
}
