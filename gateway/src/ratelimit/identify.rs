//! The process-wide shared identify budget.
//!
//! Unlike the per-session global bucket, this bucket's limit isn't known
//! until a `GetGatewayBot` response reports `max_concurrency`; it starts at
//! `1` (safe for any bot) and is widened once the real value is known.

use super::limiter::{RateLimiter, IDENTIFY_ROUTE_ID, IDENTIFY_WINDOW};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// A [`RateLimiter`] instance dedicated to the Identify bucket, shared by
/// every session on a bot token. Owned by [`crate::client::Client`];
/// sessions hold it by `Arc` and never mutate anything but this bucket.
#[derive(Debug)]
pub struct IdentifyLimiter {
    inner: RateLimiter,
    concurrency: AtomicU64,
}

impl Default for IdentifyLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifyLimiter {
    pub fn new() -> Self {
        Self {
            inner: RateLimiter::new(),
            concurrency: AtomicU64::new(1),
        }
    }

    /// Widen the bucket's limit to `max_concurrency`, as reported by a
    /// `GetGatewayBot` response. Only the limit changes; the current
    /// window's expiry is left alone unless the bucket hasn't started yet.
    pub fn set_concurrency(&self, max_concurrency: u64) {
        self.concurrency.store(max_concurrency.max(1), Ordering::Relaxed);
    }

    fn limit(&self) -> i16 {
        self.concurrency.load(Ordering::Relaxed).min(i16::MAX as u64) as i16
    }

    /// Attempt to reserve one identify slot, matching
    /// [`RateLimiter::try_reserve`]'s contract.
    pub fn try_reserve(&self, now: Instant) -> Result<(), Duration> {
        self.inner.try_reserve(IDENTIFY_ROUTE_ID, self.limit(), IDENTIFY_WINDOW, now)
    }
}

#[cfg(test)]
mod tests {
    use super::IdentifyLimiter;
    use static_assertions::assert_impl_all;
    use std::time::Instant;

    assert_impl_all!(IdentifyLimiter: Send, Sync);

    #[test]
    fn default_limit_is_one() {
        let limiter = IdentifyLimiter::new();
        let now = Instant::now();

        limiter.try_reserve(now).unwrap();
        assert!(limiter.try_reserve(now).is_err());
    }

    #[test]
    fn widened_concurrency_allows_more_in_flight() {
        let limiter = IdentifyLimiter::new();
        limiter.set_concurrency(2);
        let now = Instant::now();

        limiter.try_reserve(now).unwrap();
        limiter.try_reserve(now).unwrap();
        assert!(limiter.try_reserve(now).is_err());
    }
}
