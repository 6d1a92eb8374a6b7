//! A Discord Gateway session runtime: the handshake, heartbeat, rate
//! limiting, and reconnect/resume machinery that keeps a single WebSocket
//! connection to Discord's real-time Gateway alive, plus the coordination
//! needed to run many of those connections as a set of shards.
//!
//! This crate deliberately does not implement the Discord REST API, URL
//! building for REST routes, or a cache of gateway-observed entities
//! (guilds, channels, members, ...); those are the responsibility of
//! separate crates that sit on top of this one.

pub mod client;
pub mod dispatcher;
pub mod heartbeat;
pub mod json;
pub mod listener;
pub mod manager;
pub mod model;
pub mod ratelimit;
pub mod sender;
pub mod session;
pub mod session_manager;
pub mod shards;
pub mod socket;

pub use self::{
    client::{Client, ClientBuilder},
    dispatcher::Dispatcher,
    session::{
        runtime::{ClientShared, SessionHandle},
        Config, ConfigBuilder, Session, Stage,
    },
};
