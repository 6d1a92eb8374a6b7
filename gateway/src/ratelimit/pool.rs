//! Reuse of [`Bucket`] records and outbound payload buffers to keep the
//! command sender's hot path free of allocation churn.

use super::bucket::Bucket;
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// Caps how many freed buckets/buffers a pool holds onto; beyond this, extra
/// releases are simply dropped rather than grown without bound.
const POOL_CAPACITY: usize = 16;

/// A small free-list of [`Bucket`] values.
#[derive(Debug, Default)]
pub struct BucketPool {
    free: Mutex<Vec<Bucket>>,
}

impl BucketPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a bucket from the pool, initialised as fresh, or allocate one if
    /// the pool is empty.
    pub fn acquire(&self, limit: i16, interval: Duration, now: Instant) -> Bucket {
        let mut bucket = self
            .free
            .lock()
            .expect("bucket pool poisoned")
            .pop()
            .unwrap_or_else(|| Bucket::new(limit, interval, now));

        bucket.limit = limit;
        bucket.reset(interval, now);

        bucket
    }

    /// Return a bucket to the pool for reuse.
    pub fn release(&self, bucket: Bucket) {
        let mut free = self.free.lock().expect("bucket pool poisoned");

        if free.len() < POOL_CAPACITY {
            free.push(bucket);
        }
    }
}

/// A small free-list of outbound payload buffers.
#[derive(Debug, Default)]
pub struct PayloadPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl PayloadPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an empty buffer from the pool, or allocate one if empty.
    pub fn acquire(&self) -> Vec<u8> {
        self.free.lock().expect("payload pool poisoned").pop().unwrap_or_default()
    }

    /// Return a buffer to the pool, clearing it first.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();

        let mut free = self.free.lock().expect("payload pool poisoned");

        if free.len() < POOL_CAPACITY {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BucketPool, PayloadPool};
    use std::time::{Duration, Instant};

    #[test]
    fn bucket_pool_reuses_released_buckets() {
        let pool = BucketPool::new();
        let now = Instant::now();

        let bucket = pool.acquire(120, Duration::from_secs(60), now);
        pool.release(bucket);

        assert_eq!(pool.free.lock().unwrap().len(), 1);

        let reused = pool.acquire(120, Duration::from_secs(60), now);
        assert_eq!(reused.remaining, 120);
        assert_eq!(pool.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn payload_pool_clears_on_release() {
        let pool = PayloadPool::new();

        let mut buf = pool.acquire();
        buf.extend_from_slice(b"hello");
        pool.release(buf);

        let reused = pool.acquire();
        assert!(reused.is_empty());
    }
}
