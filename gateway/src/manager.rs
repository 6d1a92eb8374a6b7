//! Supervises a single session's lifetime: decides, from a disconnect's
//! close code (or its absence), whether to resume, reconnect fresh, or give
//! up for good, and fans in exit reasons from the session's background
//! tasks through a single-slot events channel.

use crate::model::CloseCode;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinSet,
};

/// What the supervisor should do after a session's connection drops.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconnectPolicy {
    /// Reuse resume credentials; the gateway promised replay of missed
    /// events.
    Resume,
    /// Reconnect with a fresh `IDENTIFY`; resume credentials are no longer
    /// valid (or none exist yet).
    Reconnect,
    /// The error is not recoverable by reconnecting at all; give up.
    Fatal,
}

/// Map a gateway close code to the action the supervisor should take.
///
/// A missing close code (e.g. the TCP connection simply dropped, or the
/// server sent no close frame) is treated the same as a resumable
/// disconnect: Discord's own guidance is that most non-close-frame
/// disconnects are safe to resume.
pub fn policy_for_close(code: Option<CloseCode>) -> ReconnectPolicy {
    match code {
        None => ReconnectPolicy::Resume,
        Some(code) => match code {
            CloseCode::UnknownError
            | CloseCode::UnknownOpcode
            | CloseCode::DecodeError
            | CloseCode::NotAuthenticated
            | CloseCode::AlreadyAuthenticated
            | CloseCode::RateLimited
            | CloseCode::SessionTimedOut => ReconnectPolicy::Resume,

            CloseCode::InvalidSequence => ReconnectPolicy::Reconnect,

            CloseCode::AuthenticationFailed
            | CloseCode::InvalidShard
            | CloseCode::ShardingRequired
            | CloseCode::InvalidApiVersion
            | CloseCode::InvalidIntents
            | CloseCode::DisallowedIntents => ReconnectPolicy::Fatal,
        },
    }
}

/// Cooperative shutdown signal shared by a session's background tasks.
#[derive(Debug, Default)]
pub struct Shutdown {
    notify: Notify,
    cancelled: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        self.notify.notified().await;
    }
}

/// Owns a session's group of background tasks (socket forwarder, heartbeat
/// pulse, listener) and a single-slot channel those tasks report their exit
/// reason (`E`) into. The first event received is the session's cue to tear
/// the rest of the group down.
#[derive(Debug)]
pub struct Manager<E> {
    tasks: JoinSet<()>,
    shutdown: Arc<Shutdown>,
    events_tx: mpsc::UnboundedSender<E>,
    events_rx: mpsc::UnboundedReceiver<E>,
}

impl<E: Send + 'static> Default for Manager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> Manager<E> {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            tasks: JoinSet::new(),
            shutdown: Shutdown::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown)
    }

    /// A sender into this manager's events channel, for a spawned task to
    /// report its exit reason with.
    pub fn events_sender(&self) -> mpsc::UnboundedSender<E> {
        self.events_tx.clone()
    }

    /// Spawn a task as part of this session's group.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Signal every task in the group to stop, then abort whichever ones are
    /// still running and wait for the group to finish. Tasks in this crate
    /// don't poll `shutdown_handle()` themselves (aborting is enough to stop
    /// a channel read or a sleep), but it's left available for one that
    /// needs to run cleanup before exiting.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        self.tasks.abort_all();

        while self.tasks.join_next().await.is_some() {}
    }

    /// Wait for the first subordinate task to report an exit reason.
    pub async fn next_event(&mut self) -> Option<E> {
        self.events_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::{policy_for_close, Manager, ReconnectPolicy, Shutdown};
    use crate::model::CloseCode;
    use std::sync::atomic::Ordering;

    #[test]
    fn authentication_failure_is_fatal() {
        assert_eq!(
            policy_for_close(Some(CloseCode::AuthenticationFailed)),
            ReconnectPolicy::Fatal
        );
    }

    #[test]
    fn disallowed_intents_is_fatal() {
        assert_eq!(
            policy_for_close(Some(CloseCode::DisallowedIntents)),
            ReconnectPolicy::Fatal
        );
    }

    #[test]
    fn invalid_sequence_forces_fresh_identify() {
        assert_eq!(
            policy_for_close(Some(CloseCode::InvalidSequence)),
            ReconnectPolicy::Reconnect
        );
    }

    #[test]
    fn missing_close_code_is_resumable() {
        assert_eq!(policy_for_close(None), ReconnectPolicy::Resume);
    }

    #[test]
    fn session_timeout_is_resumable() {
        assert_eq!(
            policy_for_close(Some(CloseCode::SessionTimedOut)),
            ReconnectPolicy::Resume
        );
    }

    #[tokio::test]
    async fn shutdown_wakes_all_waiters() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = std::sync::Arc::clone(&shutdown);
            tokio::spawn(async move {
                shutdown.cancelled().await;
            })
        };

        shutdown.cancel();
        waiter.await.unwrap();
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn manager_shutdown_drains_all_tasks() {
        let mut manager = Manager::<()>::new();
        let handle = manager.shutdown_handle();

        manager.spawn(async move {
            handle.cancelled().await;
        });

        // shutdown() consumes the manager once every spawned task exits.
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn next_event_reports_the_first_reported_exit() {
        let mut manager = Manager::<&'static str>::new();
        let events = manager.events_sender();

        manager.spawn(async move {
            let _ = events.send("done");
        });

        assert_eq!(manager.next_event().await, Some("done"));
    }

    #[test]
    fn shutdown_cancelled_flag_is_idempotent() {
        let shutdown = Shutdown::new();
        shutdown.cancel();
        shutdown.cancel();
        assert!(shutdown.cancelled.load(Ordering::SeqCst));
    }
}
