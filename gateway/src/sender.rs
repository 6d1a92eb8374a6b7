//! The command sender: the only path by which frames reach the socket, and
//! the enforcement point for both layers of rate limiting.
//!
//! Two budgets gate an Identify. The per-connection *global* bucket (120
//! commands / 60 seconds) lives in this session's own [`RateLimiter`]. The
//! *identify* budget is a second, process-wide [`IdentifyLimiter`] shared by
//! every session on the same bot token. Both are checked inside the same
//! `StartTx` retry loop: an Identify only proceeds once it has room in
//! *both* buckets, decremented together before the frame is handed to the
//! socket. Every other command only ever consults the global bucket.

use crate::ratelimit::{IdentifyLimiter, RateLimiter, GLOBAL_LIMIT, GLOBAL_ROUTE_ID, GLOBAL_WINDOW};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc::UnboundedSender;

/// Sends frames to a session's socket, honoring both rate-limit layers.
///
/// Cheaply `Clone`able: every clone shares the same bucket and outbound
/// channel, which is how the heartbeat and listener tasks each get their own
/// handle to the one socket a session owns.
#[derive(Clone, Debug)]
pub struct CommandSender {
    limiter: Arc<RateLimiter>,
    tx: UnboundedSender<Vec<u8>>,
}

/// The sender's outbound channel is gone; the socket has already been torn
/// down.
#[derive(Debug)]
pub struct SendError;

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("socket channel is closed")
    }
}

impl std::error::Error for SendError {}

impl CommandSender {
    pub fn new(limiter: Arc<RateLimiter>, tx: UnboundedSender<Vec<u8>>) -> Self {
        Self { limiter, tx }
    }

    /// Send an ordinary gateway command (including Resume and heartbeats),
    /// subject to the per-connection global bucket only.
    ///
    /// This is the two-phase "wait then commit" protocol: the outer
    /// `Lock`/`Unlock` serializes the whole send so concurrent callers don't
    /// race past the bucket check together, and each `StartTx`/`EndTx` pair
    /// is a short synchronous peek-or-decrement that never spans an
    /// `.await`.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        let _processing = self.limiter.lock().await;
        self.wait_for_global().await;
        self.tx.send(payload).map_err(|_| SendError)
    }

    /// Send an Identify command, nesting a check of the shared process-wide
    /// identify bucket inside the same retry loop as the per-connection
    /// global bucket: both must have room, and both are decremented
    /// together, before the frame is handed to the socket.
    pub async fn send_identify(&self, identify: &IdentifyLimiter, payload: Vec<u8>) -> Result<(), SendError> {
        let _processing = self.limiter.lock().await;

        loop {
            let now = Instant::now();

            let global_wait = {
                let mut tx = self.limiter.start_tx();
                let mut global = tx.reset_if_expired(GLOBAL_ROUTE_ID, GLOBAL_LIMIT, GLOBAL_WINDOW, now);

                if !global.is_not_empty(now) {
                    Some(global.expiry.saturating_duration_since(now))
                } else {
                    match identify.try_reserve(now) {
                        Ok(()) => {
                            global.decrement();
                            tx.set(GLOBAL_ROUTE_ID, global);
                            None
                        }
                        Err(wait) => Some(wait),
                    }
                }
            };

            match global_wait {
                None => break,
                Some(wait) => tokio::time::sleep(wait.max(Duration::from_millis(1))).await,
            }
        }

        self.tx.send(payload).map_err(|_| SendError)
    }

    async fn wait_for_global(&self) {
        loop {
            let now = Instant::now();
            let wait = {
                let mut tx = self.limiter.start_tx();
                let mut bucket = tx.reset_if_expired(GLOBAL_ROUTE_ID, GLOBAL_LIMIT, GLOBAL_WINDOW, now);

                if bucket.is_not_empty(now) {
                    bucket.decrement();
                    tx.set(GLOBAL_ROUTE_ID, bucket);
                    None
                } else {
                    Some(bucket.expiry.saturating_duration_since(now))
                }
            };

            match wait {
                None => return,
                Some(wait) => tokio::time::sleep(wait.max(Duration::from_millis(1))).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CommandSender;
    use crate::ratelimit::{Bucket, IdentifyLimiter, RateLimiter, GLOBAL_ROUTE_ID, GLOBAL_WINDOW};
    use std::{sync::Arc, time::Instant};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn send_decrements_bucket_and_forwards_payload() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = CommandSender::new(Arc::clone(&limiter), tx);

        sender.send(b"frame".to_vec()).await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"frame");
        let bucket = limiter.start_tx().get(GLOBAL_ROUTE_ID).unwrap();
        assert_eq!(bucket.remaining, 119);
    }

    #[tokio::test(start_paused = true)]
    async fn send_waits_out_an_exhausted_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        {
            let mut tx = limiter.start_tx();
            let mut bucket = Bucket::new(1, GLOBAL_WINDOW, Instant::now());
            bucket.decrement();
            tx.set(GLOBAL_ROUTE_ID, bucket);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = CommandSender::new(limiter, tx);

        let send = tokio::spawn(async move { sender.send(b"frame".to_vec()).await });

        tokio::time::advance(GLOBAL_WINDOW).await;
        send.await.unwrap().unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"frame");
    }

    #[tokio::test]
    async fn send_identify_decrements_both_buckets() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = CommandSender::new(Arc::clone(&limiter), tx);
        let identify = IdentifyLimiter::new();

        sender.send_identify(&identify, b"identify".to_vec()).await.unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"identify");
        let bucket = limiter.start_tx().get(GLOBAL_ROUTE_ID).unwrap();
        assert_eq!(bucket.remaining, 119);
        assert!(identify.try_reserve(Instant::now()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn send_identify_waits_out_an_exhausted_identify_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = CommandSender::new(limiter, tx);
        let identify = IdentifyLimiter::new();
        identify.try_reserve(Instant::now()).unwrap();

        let identify = Arc::new(identify);
        let identify_clone = Arc::clone(&identify);
        let send = tokio::spawn(async move { sender.send_identify(&identify_clone, b"identify".to_vec()).await });

        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        send.await.unwrap().unwrap();

        assert_eq!(rx.try_recv().unwrap(), b"identify");
    }

    #[tokio::test]
    async fn send_after_channel_closed_errors() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = CommandSender::new(limiter, tx);

        assert!(sender.send(b"frame".to_vec()).await.is_err());
    }
}
