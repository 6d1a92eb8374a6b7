use crate::model::{Intents, UpdatePresencePayload};

/// The Gateway API version this runtime speaks, appended as the `v` query
/// parameter on every dial URL.
pub const API_VERSION: u32 = 10;

/// Immutable configuration for a single session, built once via
/// [`ConfigBuilder`](super::builder::ConfigBuilder) and shared by all of a
/// session's background tasks.
#[derive(Clone, Debug)]
pub struct Config {
    gateway_url: Box<str>,
    intents: Intents,
    large_threshold: u64,
    presence: Option<UpdatePresencePayload>,
    shard: [u64; 2],
    token: Box<str>,
}

impl Config {
    pub(super) fn new(token: impl Into<Box<str>>, intents: Intents) -> Self {
        Self {
            gateway_url: "wss://gateway.discord.gg".into(),
            intents,
            large_threshold: 50,
            presence: None,
            shard: [0, 1],
            token: token.into(),
        }
    }

    /// The base gateway URL, without the `v`/`encoding` query parameters a
    /// dial appends; see [`crate::socket::build_dial_url`].
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn intents(&self) -> Intents {
        self.intents
    }

    pub fn large_threshold(&self) -> u64 {
        self.large_threshold
    }

    pub fn presence(&self) -> Option<&UpdatePresencePayload> {
        self.presence.as_ref()
    }

    pub fn shard(&self) -> [u64; 2] {
        self.shard
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}
