//! Per-user, per-operation rate limiting.
//!
//! Fixed-window counters held in process memory. Each key is
//! `<operation>:<user>`; the first request in a window starts it and the
//! window boundary is absolute, not sliding. Counters from expired
//! windows are purged opportunistically once the map grows.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Purge expired buckets once the map holds this many keys.
const PURGE_AT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: i64,
    /// Requests left in the window; `-1` when limiting is disabled.
    pub remaining: i64,
    /// Milliseconds until the window resets. The HTTP layer rounds this
    /// up to whole seconds for `Retry-After`.
    pub retry_after_ms: u64,
}

impl RateLimitDecision {
    fn unlimited(limit: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: -1,
            retry_after_ms: 0,
        }
    }
}

struct Bucket {
    count: i64,
    reset_at: Instant,
}

/// Shared fixed-window limiter. One instance covers every limited
/// operation; the operation name is part of the key.
pub struct RateLimiter {
    window: Duration,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request against `<operation>:<user>`.
    ///
    /// A non-positive limit disables limiting for the call. Mutation
    /// happens under the entry lock, so concurrent callers on the same
    /// key each observe a distinct count.
    pub fn check(&self, operation: &str, user_id: &str, limit: i64) -> RateLimitDecision {
        if limit <= 0 {
            return RateLimitDecision::unlimited(limit);
        }

        let now = Instant::now();
        if self.buckets.len() > PURGE_AT {
            self.purge_expired(now);
        }

        let key = format!("{operation}:{user_id}");
        let mut bucket = self.buckets.entry(key).or_insert_with(|| Bucket {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + self.window;
        }
        bucket.count += 1;
        let count = bucket.count;
        let reset_at = bucket.reset_at;
        drop(bucket);

        let until_reset = reset_at.saturating_duration_since(now);
        RateLimitDecision {
            allowed: count <= limit,
            limit,
            remaining: (limit - count).max(0),
            retry_after_ms: u64::try_from(until_reset.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn purge_expired(&self, now: Instant) {
        self.buckets.retain(|_, bucket| now < bucket.reset_at);
    }
}
