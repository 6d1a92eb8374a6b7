use std::time::{Duration, Instant};

/// A single rate-limit window.
///
/// `remaining` is signed so that a bucket that's been decremented past zero
/// (which cannot normally happen, since callers must check [`Bucket::is_not_empty`]
/// first, but can happen if a caller decrements without checking) still
/// reports as empty rather than overflowing.
#[derive(Clone, Copy, Debug)]
pub struct Bucket {
    pub limit: i16,
    pub remaining: i16,
    pub expiry: Instant,
    /// Set while a request is holding this bucket for an in-flight send,
    /// used to avoid racing two retries of the same logical command.
    pub pending: bool,
}

impl Bucket {
    /// Create a bucket that resets to `limit` every `interval`, starting
    /// full and expiring one `interval` from `now`.
    pub fn new(limit: i16, interval: Duration, now: Instant) -> Self {
        Self {
            limit,
            remaining: limit,
            expiry: now + interval,
            pending: false,
        }
    }

    /// Whether the bucket has room for another command right now.
    pub fn is_not_empty(&self, now: Instant) -> bool {
        self.remaining > 0 && now < self.expiry
    }

    /// Whether the bucket's window has elapsed and it must be reset before
    /// further use.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }

    /// Atomically reset `remaining` to `limit` and push `expiry` out by
    /// `interval` from `now`. Idempotent: calling it twice in the same
    /// transaction just re-derives the same state from `now`.
    pub fn reset(&mut self, interval: Duration, now: Instant) {
        self.remaining = self.limit;
        self.expiry = now + interval;
        self.pending = false;
    }

    /// Consume one unit of the bucket's budget.
    pub fn decrement(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}
