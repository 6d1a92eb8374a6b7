//! Heartbeat liveness: a periodic pulse that sends heartbeats and tracks
//! whether the gateway has acknowledged them.

use rand::Rng;
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc,
};
use tokio::{sync::mpsc::UnboundedSender, time::Duration};

/// Shared heartbeat liveness state for a single session.
///
/// `unacked` starts at `1` rather than `0`: the first beat fires before any
/// ack could possibly have arrived, and decrementing from `0` would read as
/// "already missed one" and trigger a reconnect before the connection had a
/// fair chance to respond. See the crate's design notes for the rationale.
#[derive(Debug)]
pub struct Heartbeats {
    unacked: AtomicU8,
    interval_ms: AtomicU64,
}

impl Heartbeats {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            unacked: AtomicU8::new(1),
            interval_ms: AtomicU64::new(interval_ms),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_interval(&self, interval_ms: u64) {
        self.interval_ms.store(interval_ms, Ordering::Relaxed);
    }

    /// Record that a heartbeat was sent.
    pub fn note_sent(&self) {
        self.unacked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that the gateway acknowledged a heartbeat.
    pub fn note_ack(&self) {
        self.unacked.store(0, Ordering::Relaxed);
    }

    /// Whether the most recent heartbeat(s) went unacknowledged, meaning the
    /// connection should be considered dead.
    pub fn is_unacked(&self) -> bool {
        self.unacked.load(Ordering::Relaxed) > 1
    }
}

/// Outcome of one beat cycle, reported back to the session's supervisor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BeatOutcome {
    /// A heartbeat was sent successfully.
    Sent,
    /// The previous heartbeat was never acknowledged; the connection must be
    /// torn down and resumed.
    Zombied,
    /// The outbound channel is closed; the socket is already gone.
    ChannelClosed,
}

/// A single heartbeat payload frame, pre-serialized by the caller.
pub type HeartbeatFrame = Vec<u8>;

/// Runs the periodic heartbeat loop for a session: sleeps for the
/// configured interval (jittering only the first beat, matching Discord's
/// own recommendation to avoid a thundering herd of reconnecting shards),
/// then sends a heartbeat and checks whether the prior one was acked.
///
/// This task owns no socket; it only decides *when* to beat and reports the
/// outcome. The caller supplies a `frame` factory so the current sequence
/// number can be read fresh on every beat.
pub async fn pulse<F>(
    heartbeats: Arc<Heartbeats>,
    tx: UnboundedSender<HeartbeatFrame>,
    mut frame: F,
) -> BeatOutcome
where
    F: FnMut() -> HeartbeatFrame,
{
    let first_delay = with_jitter(heartbeats.interval());
    tokio::time::sleep(first_delay).await;

    loop {
        if let Some(outcome) = beat(&heartbeats, &tx, &mut frame) {
            return outcome;
        }

        // The ticker is not reset by this beat; it keeps firing on the
        // server-provided interval regardless of when the last beat landed.
        tokio::time::sleep(heartbeats.interval()).await;
    }
}

/// One beat: check the previous ack, then send. Returns `Some(outcome)` if
/// the loop should stop (zombied connection or closed channel), `None` to
/// keep beating.
fn beat<F>(heartbeats: &Arc<Heartbeats>, tx: &UnboundedSender<HeartbeatFrame>, frame: &mut F) -> Option<BeatOutcome>
where
    F: FnMut() -> HeartbeatFrame,
{
    if heartbeats.is_unacked() {
        return Some(BeatOutcome::Zombied);
    }

    heartbeats.note_sent();

    if tx.send(frame()).is_err() {
        return Some(BeatOutcome::ChannelClosed);
    }

    None
}

/// Jitter a duration by a random factor in `[0, 1)`, matching Discord's
/// guidance to randomize the first heartbeat within the interval.
fn with_jitter(interval: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.0..1.0);

    interval.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::{beat, BeatOutcome, Heartbeats};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn starts_with_one_unacked_so_first_beat_does_not_zombie() {
        let heartbeats = Heartbeats::new(45_000);
        assert!(!heartbeats.is_unacked());
    }

    #[test]
    fn second_unacked_beat_is_zombied() {
        let heartbeats = Arc::new(Heartbeats::new(45_000));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(beat(&heartbeats, &tx, &mut || vec![1]), None);
        assert!(rx.try_recv().is_ok());

        // No ack arrived between beats: the second beat sees two unacked
        // sends and reports the connection as dead.
        assert_eq!(beat(&heartbeats, &tx, &mut || vec![1]), Some(BeatOutcome::Zombied));
    }

    #[test]
    fn ack_resets_unacked_counter() {
        let heartbeats = Arc::new(Heartbeats::new(45_000));
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(beat(&heartbeats, &tx, &mut || vec![1]), None);
        heartbeats.note_ack();

        assert_eq!(beat(&heartbeats, &tx, &mut || vec![1]), None);
    }

    #[test]
    fn closed_channel_is_reported() {
        let heartbeats = Arc::new(Heartbeats::new(45_000));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        assert_eq!(beat(&heartbeats, &tx, &mut || vec![1]), Some(BeatOutcome::ChannelClosed));
    }
}
