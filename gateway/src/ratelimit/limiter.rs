use super::{bucket::Bucket, pool::BucketPool};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

/// Identifies a bucket within a [`RateLimiter`].
///
/// Route IDs are opaque to the limiter; callers agree on a numbering scheme.
/// [`GLOBAL_ROUTE_ID`] is reserved for the per-connection command cap.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RouteId(pub u64);

/// The bucket implementing the per-connection global command cap (120
/// commands / 60 seconds, unless configured otherwise).
pub const GLOBAL_ROUTE_ID: RouteId = RouteId(0);

/// Default limit and window of the global per-connection command bucket.
pub const GLOBAL_LIMIT: i16 = 120;
pub const GLOBAL_WINDOW: Duration = Duration::from_secs(60);

/// The bucket implementing the process-wide shared identify cap, owned by
/// the [`crate::client::Client`] rather than by any one session.
pub const IDENTIFY_ROUTE_ID: RouteId = RouteId(1);

/// Window of the shared identify bucket; Discord's documented identify
/// concurrency window is a rolling 5 seconds.
pub const IDENTIFY_WINDOW: Duration = Duration::from_secs(5);

/// A transactional, keyed rate limiter.
///
/// Two locks compose: an outer `tokio::sync::Mutex` ([`RateLimiter::lock`])
/// serialises an entire "in processing" command so that only one command is
/// being evaluated against the limiter at a time, and an inner
/// `std::sync::Mutex` ([`RateLimiter::start_tx`]) guards bucket reads/writes
/// as a short, synchronous critical section that never holds across an
/// `.await`.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<RouteId, Bucket>>,
    aliases: Mutex<HashMap<Box<str>, RouteId>>,
    processing: AsyncMutex<()>,
    pool: BucketPool,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
            processing: AsyncMutex::new(()),
            pool: BucketPool::new(),
        }
    }

    /// Serialise an entire command's ratelimit evaluation and send. Held for
    /// as long as a single command is "in processing".
    pub async fn lock(&self) -> AsyncMutexGuard<'_, ()> {
        self.processing.lock().await
    }

    /// Begin a short transaction over the bucket map. The returned guard
    /// must not be held across an `.await` point.
    pub fn start_tx(&self) -> Transaction<'_> {
        Transaction {
            pool: &self.pool,
            guard: self.buckets.lock().expect("ratelimit buckets poisoned"),
        }
    }

    /// Look up a bucket by alias name, e.g. a command's event name.
    pub fn get_bucket_from_id(&self, name: &str) -> Option<Bucket> {
        let route = *self.aliases.lock().expect("ratelimit aliases poisoned").get(name)?;

        self.start_tx().get(route)
    }

    /// Associate an alias name with a route and store its bucket.
    pub fn set_bucket_from_id(&self, name: impl Into<Box<str>>, route: RouteId, bucket: Bucket) {
        self.aliases
            .lock()
            .expect("ratelimit aliases poisoned")
            .insert(name.into(), route);

        self.start_tx().set(route, bucket);
    }

    /// A single `StartTx`/`EndTx` attempt to reserve one unit of `route`'s
    /// bucket, resetting it first if its window has expired.
    ///
    /// Returns `Ok(())` having already decremented on success, or
    /// `Err(wait)` with how long the caller should sleep before retrying if
    /// the bucket is exhausted.
    pub fn try_reserve(&self, route: RouteId, limit: i16, interval: Duration, now: Instant) -> Result<(), Duration> {
        let mut tx = self.start_tx();
        let mut bucket = tx.reset_if_expired(route, limit, interval, now);

        if bucket.is_not_empty(now) {
            bucket.decrement();
            tx.set(route, bucket);
            Ok(())
        } else {
            Err(bucket.expiry.saturating_duration_since(now))
        }
    }
}

/// A short-lived transaction over a [`RateLimiter`]'s bucket map.
///
/// `StartTx`/`EndTx` from the design map to [`RateLimiter::start_tx`] and
/// this guard's `Drop`.
pub struct Transaction<'a> {
    pool: &'a BucketPool,
    guard: MutexGuard<'a, HashMap<RouteId, Bucket>>,
}

impl Transaction<'_> {
    /// Read a bucket's current state.
    pub fn get(&self, route: RouteId) -> Option<Bucket> {
        self.guard.get(&route).copied()
    }

    /// Overwrite a bucket's state.
    pub fn set(&mut self, route: RouteId, bucket: Bucket) {
        self.guard.insert(route, bucket);
    }

    /// Read a bucket, creating and inserting a fresh one (pulled from the
    /// pool) if it doesn't exist yet.
    pub fn get_or_init(&mut self, route: RouteId, limit: i16, interval: Duration) -> Bucket {
        if let Some(bucket) = self.guard.get(&route) {
            return *bucket;
        }

        let bucket = self.pool.acquire(limit, interval, Instant::now());
        self.guard.insert(route, bucket);

        bucket
    }

    /// Reset a bucket if it has expired, returning its up-to-date state.
    /// Creates the bucket with `limit`/`interval` if it doesn't exist yet.
    pub fn reset_if_expired(&mut self, route: RouteId, limit: i16, interval: Duration, now: Instant) -> Bucket {
        let bucket = self.guard.entry(route).or_insert_with(|| Bucket::new(limit, interval, now));

        if bucket.is_expired(now) {
            bucket.reset(interval, now);
        }

        *bucket
    }
}
