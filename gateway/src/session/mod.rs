//! A single gateway connection's session state: handshake progress,
//! sequence tracking, and the resume credentials needed to recover a
//! dropped connection without replaying missed events from scratch.

pub mod builder;
pub mod config;
pub mod runtime;
mod stage;

pub use self::{
    builder::{ConfigBuilder, ShardIdError, ShardIdErrorType},
    config::Config,
    stage::{Stage, StageCell},
};

use crate::{
    heartbeat::Heartbeats,
    json,
    model::{Identify, IdentifyProperties, OpCode, Payload, Resume},
    ratelimit::{IdentifyLimiter, RateLimiter},
    sender::{CommandSender, SendError},
};
use serde_json::Value;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

/// A session failed to serialize or send a command.
#[derive(Debug)]
pub struct SessionSendError {
    kind: SessionSendErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl SessionSendError {
    pub const fn kind(&self) -> &SessionSendErrorType {
        &self.kind
    }
}

impl Display for SessionSendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            SessionSendErrorType::Sending => f.write_str("sending the command over the socket failed"),
            SessionSendErrorType::Serializing => f.write_str("serializing the command as json failed"),
        }
    }
}

impl Error for SessionSendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|source| source as &(dyn Error + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SessionSendErrorType {
    Sending,
    Serializing,
}

impl From<SendError> for SessionSendError {
    fn from(source: SendError) -> Self {
        Self {
            kind: SessionSendErrorType::Sending,
            source: Some(Box::new(source)),
        }
    }
}

/// Resumable connection credentials, filled in after a `READY` or
/// `RESUMED` dispatch and consulted on the next reconnect.
#[derive(Debug, Default)]
struct ResumeState {
    session_id: Option<Box<str>>,
    resume_gateway_url: Option<Box<str>>,
}

/// A single gateway connection.
///
/// Owns the handshake/run lifecycle ([`Stage`]), the last sequence number
/// seen, resume credentials, heartbeat liveness, and the per-connection
/// command bucket. Socket I/O itself lives outside this type; `Session` is
/// the piece of shared state the heartbeat task, the listener, and the
/// command sender all need concurrent access to.
#[derive(Debug)]
pub struct Session {
    config: Arc<Config>,
    heartbeats: Arc<Heartbeats>,
    ratelimiter: Arc<RateLimiter>,
    resume: Mutex<ResumeState>,
    seq: AtomicU64,
    stage: StageCell,
}

impl Session {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            heartbeats: Arc::new(Heartbeats::new(45_000)),
            ratelimiter: Arc::new(RateLimiter::new()),
            resume: Mutex::new(ResumeState::default()),
            seq: AtomicU64::new(0),
            stage: StageCell::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    pub fn set_stage(&self, stage: Stage) {
        self.stage.set(stage);
    }

    /// Attempt to move from `from` to `to`, returning whether this caller
    /// won the race. Used to guarantee only one in-flight `connect` per
    /// session.
    pub fn try_transition(&self, from: Stage, to: Stage) -> bool {
        self.stage.try_transition(from, to)
    }

    pub fn heartbeats(&self) -> &Arc<Heartbeats> {
        &self.heartbeats
    }

    pub fn ratelimiter(&self) -> &Arc<RateLimiter> {
        &self.ratelimiter
    }

    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    pub fn set_sequence(&self, seq: u64) {
        self.seq.store(seq, Ordering::Relaxed);
    }

    pub fn session_id(&self) -> Option<Box<str>> {
        self.resume.lock().expect("resume state poisoned").session_id.clone()
    }

    pub fn resume_gateway_url(&self) -> Option<Box<str>> {
        self.resume
            .lock()
            .expect("resume state poisoned")
            .resume_gateway_url
            .clone()
    }

    /// Record resume credentials handed back on `READY`/`RESUMED`.
    pub fn set_resume_state(&self, session_id: impl Into<Box<str>>, resume_gateway_url: impl Into<Box<str>>) {
        let mut resume = self.resume.lock().expect("resume state poisoned");
        resume.session_id = Some(session_id.into());
        resume.resume_gateway_url = Some(resume_gateway_url.into());
    }

    /// Whether this session has enough state to attempt a resume rather
    /// than a fresh identify: a non-empty session ID, a known resume
    /// endpoint, and a sequence number greater than zero.
    pub fn is_resumable(&self) -> bool {
        let resume = self.resume.lock().expect("resume state poisoned");

        resume.session_id.is_some() && resume.resume_gateway_url.is_some() && self.sequence() > 0
    }

    /// Clear resume credentials, forcing the next reconnect to identify
    /// fresh. Used when the gateway reports a non-resumable invalid
    /// session.
    pub fn invalidate_session(&self) {
        let mut resume = self.resume.lock().expect("resume state poisoned");
        resume.session_id = None;
        resume.resume_gateway_url = None;
        self.seq.store(0, Ordering::Relaxed);
    }

    /// Build either an Identify or a Resume frame, depending on
    /// [`Session::is_resumable`].
    pub fn handshake_frame(&self) -> Result<Vec<u8>, SessionSendError> {
        if self.is_resumable() {
            let session_id = self.session_id().expect("checked by is_resumable");

            let payload = Payload::new(
                OpCode::Resume,
                Resume {
                    token: self.config.token().into(),
                    session_id,
                    seq: self.sequence(),
                },
            );

            json::to_vec(&payload).map_err(|source| SessionSendError {
                kind: SessionSendErrorType::Serializing,
                source: Some(Box::new(source)),
            })
        } else {
            let payload = Payload::new(
                OpCode::Identify,
                Identify {
                    token: self.config.token().into(),
                    properties: IdentifyProperties::default(),
                    compress: Some(true),
                    large_threshold: self.config.large_threshold(),
                    shard: Some(self.config.shard()),
                    presence: self.config.presence().cloned(),
                    intents: self.config.intents(),
                },
            );

            json::to_vec(&payload).map_err(|source| SessionSendError {
                kind: SessionSendErrorType::Serializing,
                source: Some(Box::new(source)),
            })
        }
    }

    /// Send the handshake frame (Identify or Resume) through `sender`,
    /// waiting on the shared process-wide identify budget only when
    /// identifying fresh.
    pub async fn send_handshake(&self, sender: &CommandSender, identify: &IdentifyLimiter) -> Result<(), SessionSendError> {
        let resumable = self.is_resumable();
        let frame = self.handshake_frame()?;

        if resumable {
            sender.send(frame).await.map_err(Into::into)
        } else {
            sender.send_identify(identify, frame).await.map_err(Into::into)
        }
    }

    /// Build a heartbeat frame carrying the last sequence number seen (or
    /// `null`, before any dispatch has arrived).
    pub fn heartbeat_frame(&self) -> Result<Vec<u8>, SessionSendError> {
        let seq = self.sequence();
        let d = if seq == 0 { Value::Null } else { Value::from(seq) };

        json::to_vec(&Payload::new(OpCode::Heartbeat, d)).map_err(|source| SessionSendError {
            kind: SessionSendErrorType::Serializing,
            source: Some(Box::new(source)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigBuilder, Session, Stage};
    use crate::model::Intents;
    use std::sync::Arc;

    fn session() -> Session {
        let config: Config = ConfigBuilder::new("token", Intents::empty()).build();
        Session::new(Arc::new(config))
    }

    #[test]
    fn fresh_session_is_not_resumable() {
        let session = session();
        assert!(!session.is_resumable());
    }

    #[test]
    fn resumable_after_ready_and_sequence() {
        let session = session();
        session.set_resume_state("session-id", "wss://resume.example");
        session.set_sequence(5);

        assert!(session.is_resumable());
    }

    #[test]
    fn zero_sequence_blocks_resume() {
        let session = session();
        session.set_resume_state("session-id", "wss://resume.example");

        assert!(!session.is_resumable());
    }

    #[test]
    fn invalidate_clears_resume_state() {
        let session = session();
        session.set_resume_state("session-id", "wss://resume.example");
        session.set_sequence(5);

        session.invalidate_session();

        assert!(!session.is_resumable());
        assert_eq!(session.sequence(), 0);
    }

    #[test]
    fn handshake_frame_picks_identify_when_fresh() {
        let session = session();
        let frame = session.handshake_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(value["op"], 2);
    }

    #[test]
    fn handshake_frame_picks_resume_when_eligible() {
        let session = session();
        session.set_resume_state("session-id", "wss://resume.example");
        session.set_sequence(5);

        let frame = session.handshake_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(value["op"], 6);
        assert_eq!(value["d"]["session_id"], "session-id");
    }

    #[test]
    fn heartbeat_frame_carries_null_before_first_dispatch() {
        let session = session();
        let frame = session.heartbeat_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(value["op"], 1);
        assert!(value["d"].is_null());
    }

    #[test]
    fn heartbeat_frame_carries_last_sequence() {
        let session = session();
        session.set_sequence(7);
        let frame = session.heartbeat_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(value["d"], 7);
    }

    #[test]
    fn stage_transition_is_exclusive() {
        let session = session();

        assert!(session.try_transition(Stage::Idle, Stage::Connecting));
        assert!(!session.try_transition(Stage::Idle, Stage::Connecting));
    }
}
