//! Turns parsed gateway frames into session-state updates and either a
//! dispatch to hand off to the [`crate::dispatcher::Dispatcher`] or a
//! control action for the session's supervisor to act on.

use crate::{
    dispatcher::Dispatcher,
    model::GatewayEvent,
    session::Session,
};
use std::sync::Arc;

/// What the caller (normally the session's supervising task) should do
/// after a frame has been processed.
#[derive(Debug)]
pub enum ListenerAction {
    /// Nothing further is needed; the frame updated internal state only.
    None,
    /// A heartbeat must be sent immediately, out of the normal cycle,
    /// because the gateway asked for one.
    SendHeartbeat,
    /// The gateway is asking the client to reconnect; resume is still
    /// valid.
    Reconnect,
    /// The session was invalidated; `resumable` says whether a `RESUME`
    /// is still possible or a fresh `IDENTIFY` is required.
    InvalidSession { resumable: bool },
}

/// Apply one decoded frame to `session`, updating sequence/ack/resume state
/// and dispatching events through `dispatcher`.
///
/// This is synchronous and infallible by design: frame handling must never
/// block on anything other than the dispatcher's fire-and-forget spawn, so
/// a single slow handler can't stall the socket read loop.
pub fn process_frame(session: &Arc<Session>, dispatcher: &Dispatcher, event: GatewayEvent) -> ListenerAction {
    match event {
        GatewayEvent::Dispatch(seq, name, data) => {
            session.set_sequence(seq);

            if &*name == "READY" {
                if let Ok(ready) = serde_json::from_value::<crate::model::Ready>(data.clone()) {
                    session.set_resume_state(ready.session_id, ready.resume_gateway_url);
                }
            }

            dispatcher.dispatch(name, data);

            ListenerAction::None
        }
        GatewayEvent::Heartbeat => ListenerAction::SendHeartbeat,
        GatewayEvent::HeartbeatAck => {
            session.heartbeats().note_ack();
            ListenerAction::None
        }
        GatewayEvent::Hello(interval_ms) => {
            session.heartbeats().set_interval(interval_ms);
            ListenerAction::None
        }
        GatewayEvent::InvalidSession(resumable) => {
            if !resumable {
                session.invalidate_session();
            }

            ListenerAction::InvalidSession { resumable }
        }
        GatewayEvent::Reconnect => ListenerAction::Reconnect,
    }
}

#[cfg(test)]
mod tests {
    use super::{process_frame, ListenerAction};
    use crate::{
        dispatcher::Dispatcher,
        model::{GatewayEvent, Intents},
        session::{Config, ConfigBuilder, Session},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn session() -> Arc<Session> {
        let config: Config = ConfigBuilder::new("token", Intents::empty()).build();
        Arc::new(Session::new(Arc::new(config)))
    }

    #[test]
    fn ready_dispatch_seeds_resume_state() {
        let session = session();
        let dispatcher = Dispatcher::new();

        let event = GatewayEvent::Dispatch(
            1,
            "READY".into(),
            json!({
                "session_id": "abc123",
                "resume_gateway_url": "wss://resume.example",
                "application": { "id": "1" },
            }),
        );

        let action = process_frame(&session, &dispatcher, event);

        assert!(matches!(action, ListenerAction::None));
        assert_eq!(session.sequence(), 1);
        assert_eq!(session.session_id().as_deref(), Some("abc123"));
    }

    #[test]
    fn hello_sets_heartbeat_interval() {
        let session = session();
        let dispatcher = Dispatcher::new();

        process_frame(&session, &dispatcher, GatewayEvent::Hello(30_000));

        assert_eq!(session.heartbeats().interval().as_millis(), 30_000);
    }

    #[test]
    fn heartbeat_ack_clears_unacked_flag() {
        let session = session();
        let dispatcher = Dispatcher::new();
        session.heartbeats().note_sent();
        session.heartbeats().note_sent();
        assert!(session.heartbeats().is_unacked());

        process_frame(&session, &dispatcher, GatewayEvent::HeartbeatAck);

        assert!(!session.heartbeats().is_unacked());
    }

    #[test]
    fn non_resumable_invalid_session_clears_resume_state() {
        let session = session();
        let dispatcher = Dispatcher::new();
        session.set_resume_state("abc", "wss://resume.example");
        session.set_sequence(9);

        let action = process_frame(&session, &dispatcher, GatewayEvent::InvalidSession(false));

        assert!(matches!(action, ListenerAction::InvalidSession { resumable: false }));
        assert!(!session.is_resumable());
    }

    #[test]
    fn resumable_invalid_session_keeps_resume_state() {
        let session = session();
        let dispatcher = Dispatcher::new();
        session.set_resume_state("abc", "wss://resume.example");
        session.set_sequence(9);

        process_frame(&session, &dispatcher, GatewayEvent::InvalidSession(true));

        assert!(session.is_resumable());
    }

    #[test]
    fn gateway_heartbeat_request_asks_caller_to_beat() {
        let session = session();
        let dispatcher = Dispatcher::new();

        let action = process_frame(&session, &dispatcher, GatewayEvent::Heartbeat);

        assert!(matches!(action, ListenerAction::SendHeartbeat));
    }

    #[test]
    fn reconnect_is_surfaced() {
        let session = session();
        let dispatcher = Dispatcher::new();

        let action = process_frame(&session, &dispatcher, GatewayEvent::Reconnect);

        assert!(matches!(action, ListenerAction::Reconnect));
    }
}
