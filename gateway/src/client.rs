//! The top-level entry point: owns the resources shared across every
//! session on a bot token (the shared identify bucket) and the registry of
//! running sessions.

use crate::{
    dispatcher::Dispatcher,
    model::Intents,
    ratelimit::IdentifyLimiter,
    session::{
        runtime::{spawn_session, ClientShared, SessionHandle},
        Config, ConfigBuilder, Session,
    },
    session_manager::SessionManager,
};
use std::sync::Arc;

/// Shared, process-wide client state: one per bot token, however many
/// shards/sessions it runs.
#[derive(Debug)]
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    identify_limiter: Arc<IdentifyLimiter>,
    sessions: Arc<SessionManager>,
    token: Box<str>,
}

impl Client {
    pub fn new(token: impl Into<Box<str>>) -> Self {
        ClientBuilder::new(token).build()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The shared process-wide identify bucket every session on this
    /// token's connects go through. Its limit is widened to
    /// `max_concurrency` once a `GetGatewayBot` response is known; see
    /// [`crate::ratelimit::IdentifyLimiter::set_concurrency`].
    pub fn identify_limiter(&self) -> &Arc<IdentifyLimiter> {
        &self.identify_limiter
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Build a [`ConfigBuilder`] seeded with this client's token, ready for
    /// a caller to fill in shard ID, intents, and presence before starting a
    /// session.
    pub fn session_config(&self, intents: Intents) -> ConfigBuilder {
        ConfigBuilder::new(self.token.clone(), intents)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    pub async fn remove_session(&self, id: &str) {
        self.sessions.remove(id).await;
    }

    /// Start a session from `config` and spawn its supervising task:
    /// dialing, handshaking, and reconnecting according to
    /// [`crate::manager::policy_for_close`] until the returned
    /// [`SessionHandle`] is disconnected or the gateway reports a fatal
    /// error.
    pub fn connect_session(&self, config: Config) -> (Arc<Session>, SessionHandle) {
        let session = Arc::new(Session::new(Arc::new(config)));
        let shared = ClientShared {
            dispatcher: Arc::clone(&self.dispatcher),
            identify_limiter: Arc::clone(&self.identify_limiter),
            sessions: Arc::clone(&self.sessions),
        };

        let handle = spawn_session(Arc::clone(&session), shared);

        (session, handle)
    }
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    dispatcher: Arc<Dispatcher>,
    identify_concurrency: u64,
    token: Box<str>,
}

impl ClientBuilder {
    pub fn new(token: impl Into<Box<str>>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new()),
            identify_concurrency: 1,
            token: token.into(),
        }
    }

    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Pre-seed the shared identify bucket's limit, e.g. from a
    /// `GetGatewayBot` response fetched before the client is built. Sessions
    /// can still widen it later via
    /// [`Client::identify_limiter`]`.set_concurrency`.
    pub fn identify_concurrency(mut self, max_concurrency: u64) -> Self {
        self.identify_concurrency = max_concurrency;
        self
    }

    pub fn build(self) -> Client {
        let identify_limiter = Arc::new(IdentifyLimiter::new());
        identify_limiter.set_concurrency(self.identify_concurrency);

        Client {
            dispatcher: self.dispatcher,
            identify_limiter,
            sessions: Arc::new(SessionManager::new()),
            token: self.token,
        }
    }
}

/// Also exposed directly so a fresh [`Config`] can be constructed without a
/// [`Client`] in tests or single-shard embeddings.
pub fn standalone_config(token: impl Into<Box<str>>, intents: Intents) -> Config {
    ConfigBuilder::new(token, intents).build()
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::model::Intents;

    #[tokio::test]
    async fn fresh_client_has_no_sessions() {
        let client = Client::new("token");
        assert_eq!(client.session_count().await, 0);
    }

    #[test]
    fn session_config_inherits_token() {
        let client = Client::new("Bot abc");
        let config = client.session_config(Intents::GUILDS).build();

        assert_eq!(config.token(), "Bot abc");
    }
}
