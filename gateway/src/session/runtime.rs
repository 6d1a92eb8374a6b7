//! Orchestrates a session's full lifetime: dialing the socket, handshaking
//! (Identify/Resume, including the replay that follows a Resume), and
//! driving the steady-state heartbeat/listener loop until the connection
//! needs to be torn down, at which point it decides whether to resume,
//! reconnect fresh, or give up for good.
//!
//! This is the piece that turns the session/listener/heartbeat/ratelimit
//! leaf modules into a running connection; none of those modules drive
//! themselves.

use super::{config::API_VERSION, Session, Stage};
use crate::{
    dispatcher::Dispatcher,
    heartbeat::{pulse, BeatOutcome, HeartbeatFrame},
    json,
    listener::{process_frame, ListenerAction},
    manager::{policy_for_close, Manager, ReconnectPolicy},
    model::{CloseCode, GatewayEvent, Ready},
    ratelimit::IdentifyLimiter,
    sender::CommandSender,
    session_manager::SessionManager,
    socket::{self, ForwarderExit},
};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// How long to wait before retrying a connect attempt that failed outright
/// (a dial error, or a handshake the gateway rejected twice).
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// State shared by every session a [`crate::client::Client`] runs: the
/// handler registry, the process-wide identify budget, and the registry of
/// currently-connected sessions.
#[derive(Clone, Debug)]
pub struct ClientShared {
    pub dispatcher: Arc<Dispatcher>,
    pub identify_limiter: Arc<IdentifyLimiter>,
    pub sessions: Arc<SessionManager>,
}

/// A caller-facing handle to a running session's supervising task.
#[derive(Debug)]
pub struct SessionHandle {
    control: mpsc::UnboundedSender<ControlSignal>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Ask the session to disconnect and stop reconnecting, then wait for
    /// its supervising task to exit.
    pub async fn disconnect(self) {
        let _ = self.control.send(ControlSignal::Disconnect);
        let _ = self.task.await;
    }

    /// Ask a running session to tear down its connection and reconnect with
    /// a fresh `IDENTIFY`, without waiting for the gateway to ask for it.
    pub fn reconnect(&self) {
        let _ = self.control.send(ControlSignal::Reconnect);
    }
}

#[derive(Debug)]
enum ControlSignal {
    Disconnect,
    Reconnect,
}

/// Spawn a session's supervising task: connect, run the steady-state loop,
/// and reconnect according to [`crate::manager::policy_for_close`] until the
/// caller disconnects it or the gateway reports a fatal error.
pub fn spawn_session(session: Arc<Session>, shared: ClientShared) -> SessionHandle {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_forever(session, shared, control_rx));

    SessionHandle {
        control: control_tx,
        task,
    }
}

async fn run_forever(session: Arc<Session>, shared: ClientShared, mut control: mpsc::UnboundedReceiver<ControlSignal>) {
    loop {
        match connect(&session, &shared).await {
            Ok(connected) => match run_connected(Arc::clone(&session), shared.clone(), connected, &mut control).await {
                RunOutcome::Reconnect(ReconnectPolicy::Fatal) => {
                    session.set_stage(Stage::Dead);
                    break;
                }
                RunOutcome::Reconnect(_) => continue,
                RunOutcome::Disconnected => break,
            },
            Err(err) if matches!(err.kind(), ConnectErrorType::NotIdle) => break,
            Err(_) => {
                session.set_stage(Stage::Disconnecting);
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }
}

/// A handshake attempt failed, from dialing through the Ready/Resumed
/// exchange.
#[derive(Debug)]
pub struct ConnectError {
    kind: ConnectErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ConnectError {
    pub const fn kind(&self) -> &ConnectErrorType {
        &self.kind
    }
}

impl Display for ConnectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            ConnectErrorType::NotIdle => f.write_str("a connect attempt is already in progress for this session"),
            ConnectErrorType::Dial => f.write_str("dialing the gateway, or the connection before the handshake completed, failed"),
            ConnectErrorType::Handshake => f.write_str("sending an identify or resume frame failed"),
            ConnectErrorType::Retry => f.write_str("the gateway rejected the handshake; a fresh attempt is needed"),
        }
    }
}

impl Error for ConnectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|source| source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ConnectErrorType {
    /// This session already has a connect attempt in flight.
    NotIdle,
    /// The socket never reached a usable state.
    Dial,
    /// A frame could not be sent.
    Handshake,
    /// The handshake was rejected (a second `InvalidSession`, or an
    /// unexpected `Reconnect` mid-handshake); the caller should back off and
    /// try again.
    Retry,
}

struct Connected {
    sender: CommandSender,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    socket_task: JoinHandle<ForwarderExit>,
}

/// Dial the gateway and run the handshake through to `READY`/`RESUMED`,
/// including the invalid-session retry-once rule and the replay of any
/// dispatches that arrive between a `RESUME` and its `RESUMED`.
async fn connect(session: &Arc<Session>, shared: &ClientShared) -> Result<Connected, ConnectError> {
    let transitioned =
        session.try_transition(Stage::Idle, Stage::Connecting) || session.try_transition(Stage::Disconnecting, Stage::Connecting);

    if !transitioned {
        return Err(ConnectError {
            kind: ConnectErrorType::NotIdle,
            source: None,
        });
    }

    let base = session
        .resume_gateway_url()
        .unwrap_or_else(|| session.config().gateway_url().into());

    let url = socket::build_dial_url(&base, API_VERSION).map_err(|source| ConnectError {
        kind: ConnectErrorType::Dial,
        source: Some(Box::new(source)),
    })?;

    let stream = socket::dial(&url).await.map_err(|source| ConnectError {
        kind: ConnectErrorType::Dial,
        source: Some(Box::new(source)),
    })?;

    let (inbound_tx, mut inbound) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let socket_task = tokio::spawn(socket::forward(stream, inbound_tx, outbound_rx));
    let sender = CommandSender::new(Arc::clone(session.ratelimiter()), outbound_tx);

    session.set_stage(Stage::Handshaking);

    await_hello(session, &mut inbound).await?;

    session
        .send_handshake(&sender, &shared.identify_limiter)
        .await
        .map_err(|source| ConnectError {
            kind: ConnectErrorType::Handshake,
            source: Some(Box::new(source)),
        })?;

    await_ready_or_resumed(session, shared, &sender, &mut inbound).await?;

    session.set_stage(Stage::Running);

    Ok(Connected {
        sender,
        inbound,
        socket_task,
    })
}

async fn await_hello(session: &Arc<Session>, inbound: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Result<(), ConnectError> {
    loop {
        let frame = inbound.recv().await.ok_or_else(|| ConnectError {
            kind: ConnectErrorType::Dial,
            source: None,
        })?;

        if let Ok(GatewayEvent::Hello(interval_ms)) = json::parse(&frame) {
            session.heartbeats().set_interval(interval_ms);
            return Ok(());
        }
    }
}

/// Read frames after the handshake frame was sent until either `READY` or
/// `RESUMED` arrives, replaying any other dispatch in between, retrying the
/// handshake exactly once on a resumable `InvalidSession`, and failing the
/// connect attempt on anything else that can't be recovered from here.
async fn await_ready_or_resumed(
    session: &Arc<Session>,
    shared: &ClientShared,
    sender: &CommandSender,
    inbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<(), ConnectError> {
    let mut retried_invalid_session = false;

    loop {
        let frame = inbound.recv().await.ok_or_else(|| ConnectError {
            kind: ConnectErrorType::Dial,
            source: None,
        })?;

        let Ok(event) = json::parse(&frame) else {
            continue;
        };

        match event {
            GatewayEvent::Dispatch(seq, name, data) => {
                session.set_sequence(seq);

                match &*name {
                    "READY" => {
                        let Ok(ready) = serde_json::from_value::<Ready>(data.clone()) else {
                            continue;
                        };

                        session.set_resume_state(ready.session_id.clone(), ready.resume_gateway_url);
                        // READY resets the sequence the server just handed us
                        // back to zero; the first heartbeat after a fresh
                        // identify carries `null`, not this frame's `s`.
                        session.set_sequence(0);
                        shared.sessions.insert(ready.session_id, Arc::clone(session)).await;
                        shared.dispatcher.dispatch(name, data);

                        return Ok(());
                    }
                    "RESUMED" => {
                        if let Some(id) = session.session_id() {
                            shared.sessions.insert(id, Arc::clone(session)).await;
                        }

                        shared.dispatcher.dispatch(name, data);

                        return Ok(());
                    }
                    _ => shared.dispatcher.dispatch(name, data),
                }
            }
            GatewayEvent::Heartbeat => {
                let frame = session.heartbeat_frame().map_err(|source| ConnectError {
                    kind: ConnectErrorType::Handshake,
                    source: Some(Box::new(source)),
                })?;

                sender.send(frame).await.map_err(|source| ConnectError {
                    kind: ConnectErrorType::Handshake,
                    source: Some(Box::new(source)),
                })?;
            }
            GatewayEvent::HeartbeatAck => session.heartbeats().note_ack(),
            GatewayEvent::Hello(interval_ms) => session.heartbeats().set_interval(interval_ms),
            GatewayEvent::InvalidSession(resumable) => {
                if retried_invalid_session {
                    return Err(ConnectError {
                        kind: ConnectErrorType::Retry,
                        source: None,
                    });
                }

                retried_invalid_session = true;
                tokio::time::sleep(RECONNECT_BACKOFF).await;

                // Unlike the steady-state `InvalidSession` (where the
                // `resumable` flag decides whether to resume or reconnect
                // fresh), a handshake-time invalid session always clears
                // resume state: the one retry it gets is always a fresh
                // identify.
                let _ = resumable;
                session.invalidate_session();

                session
                    .send_handshake(sender, &shared.identify_limiter)
                    .await
                    .map_err(|source| ConnectError {
                        kind: ConnectErrorType::Handshake,
                        source: Some(Box::new(source)),
                    })?;
            }
            GatewayEvent::Reconnect => {
                return Err(ConnectError {
                    kind: ConnectErrorType::Retry,
                    source: None,
                });
            }
        }
    }
}

/// What a completed connection's supervising group should do next.
enum RunOutcome {
    Reconnect(ReconnectPolicy),
    Disconnected,
}

/// Exit reasons reported by a connection's background tasks through the
/// [`Manager`]'s single-slot events channel; the first one received ends the
/// connection.
#[derive(Debug)]
enum SessionEvent {
    Forwarder(ForwarderExit),
    Heartbeat(BeatOutcome),
    Listener(ListenerAction),
}

/// Spawn the heartbeat pulse, the listener, and the socket forwarder
/// watchdog as one task group, then wait for the first of them to report an
/// exit reason (or the caller to send a control signal), tear the rest of
/// the group down, and decide what happens next.
async fn run_connected(
    session: Arc<Session>,
    shared: ClientShared,
    connected: Connected,
    control: &mut mpsc::UnboundedReceiver<ControlSignal>,
) -> RunOutcome {
    let Connected {
        sender,
        mut inbound,
        socket_task,
    } = connected;

    let mut manager = Manager::<SessionEvent>::new();
    let events = manager.events_sender();

    // `manager.shutdown()` only aborts tasks it owns; the forwarder itself
    // was spawned back in `connect()` before this group existed, so its own
    // abort handle has to be torn down alongside the group explicitly.
    let socket_abort = socket_task.abort_handle();

    {
        let events = events.clone();
        manager.spawn(async move {
            let exit = socket_task.await.unwrap_or(ForwarderExit::SocketError);
            let _ = events.send(SessionEvent::Forwarder(exit));
        });
    }

    let (beat_tx, mut beat_rx) = mpsc::unbounded_channel::<HeartbeatFrame>();

    {
        let heartbeats = Arc::clone(session.heartbeats());
        let events = events.clone();
        let frame_session = Arc::clone(&session);
        manager.spawn(async move {
            let outcome = pulse(heartbeats, beat_tx, move || frame_session.heartbeat_frame().unwrap_or_default()).await;
            let _ = events.send(SessionEvent::Heartbeat(outcome));
        });
    }

    {
        let sender = sender.clone();
        manager.spawn(async move {
            while let Some(frame) = beat_rx.recv().await {
                if sender.send(frame).await.is_err() {
                    break;
                }
            }
        });
    }

    {
        let session = Arc::clone(&session);
        let dispatcher = Arc::clone(&shared.dispatcher);
        let events = events.clone();
        let sender = sender.clone();
        manager.spawn(async move {
            loop {
                let Some(frame) = inbound.recv().await else {
                    return;
                };

                let Ok(event) = json::parse(&frame) else {
                    continue;
                };

                match process_frame(&session, &dispatcher, event) {
                    ListenerAction::None => {}
                    ListenerAction::SendHeartbeat => {
                        if let Ok(frame) = session.heartbeat_frame() {
                            let _ = sender.send(frame).await;
                        }
                    }
                    action @ (ListenerAction::Reconnect | ListenerAction::InvalidSession { .. }) => {
                        let _ = events.send(SessionEvent::Listener(action));
                        return;
                    }
                }
            }
        });
    }

    let outcome = tokio::select! {
        event = manager.next_event() => {
            socket_abort.abort();
            manager.shutdown().await;
            reconnect_policy_for(event)
        }
        Some(signal) = control.recv() => {
            // Both control signals end this connection; a `Disconnect` closes
            // it for good, a `Reconnect` tears it down to dial fresh.
            socket_abort.abort();
            manager.shutdown().await;
            match signal {
                ControlSignal::Disconnect => RunOutcome::Disconnected,
                ControlSignal::Reconnect => RunOutcome::Reconnect(ReconnectPolicy::Reconnect),
            }
        }
    };

    if let Some(id) = session.session_id() {
        shared.sessions.remove(&id).await;
    }

    // A policy of `Reconnect` (as opposed to `Resume`) means the session the
    // gateway knew about is no longer valid; the next `connect()` must not
    // try to resume it. `process_frame`'s own `InvalidSession{resumable:
    // false}` handling already clears this, so only the close-code-driven and
    // caller-driven paths need it here.
    if matches!(outcome, RunOutcome::Reconnect(ReconnectPolicy::Reconnect)) {
        session.invalidate_session();
    }

    session.set_stage(match outcome {
        RunOutcome::Reconnect(ReconnectPolicy::Fatal) => Stage::Dead,
        RunOutcome::Disconnected => Stage::Idle,
        _ => Stage::Disconnecting,
    });

    outcome
}

fn reconnect_policy_for(event: Option<SessionEvent>) -> RunOutcome {
    let policy = match event {
        Some(SessionEvent::Forwarder(ForwarderExit::Closed { code, .. })) => {
            policy_for_close(code.and_then(|code| CloseCode::try_from(code).ok()))
        }
        Some(SessionEvent::Forwarder(_)) => ReconnectPolicy::Resume,
        Some(SessionEvent::Heartbeat(_)) => ReconnectPolicy::Resume,
        Some(SessionEvent::Listener(ListenerAction::Reconnect)) => ReconnectPolicy::Reconnect,
        Some(SessionEvent::Listener(ListenerAction::InvalidSession { resumable: true })) => ReconnectPolicy::Resume,
        Some(SessionEvent::Listener(ListenerAction::InvalidSession { resumable: false })) => ReconnectPolicy::Reconnect,
        Some(SessionEvent::Listener(_)) | None => ReconnectPolicy::Resume,
    };

    RunOutcome::Reconnect(policy)
}
