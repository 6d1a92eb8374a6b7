//! The small subset of Gateway wire payloads the session runtime needs to
//! send and receive.
//!
//! The full REST record catalogue (channels, guilds, messages, ...) is out
//! of scope for this crate; only the handshake and liveness payloads live
//! here.

use super::{intents::Intents, opcode::OpCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Envelope written to the socket: `{"op": ..., "d": ...}`.
#[derive(Debug, Serialize)]
pub struct Payload<T> {
    pub op: OpCode,
    pub d: T,
}

impl<T> Payload<T> {
    pub const fn new(op: OpCode, d: T) -> Self {
        Self { op, d }
    }
}

/// A decoded incoming frame, with its payload left generic over what opcode
/// it carries.
///
/// Produced by [`crate::json::parse`].
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// An event was dispatched; carries the sequence number, event name, and
    /// raw event data.
    Dispatch(u64, Box<str>, Value),
    /// Either side is requesting a heartbeat.
    Heartbeat,
    /// A heartbeat was acknowledged.
    HeartbeatAck,
    /// Sent immediately after connecting.
    Hello(u64),
    /// The session has been invalidated; `true` if it can be resumed.
    InvalidSession(bool),
    /// The server is asking the client to reconnect and resume.
    Reconnect,
}

/// Connection properties sent with [`Identify`].
#[derive(Clone, Debug, Serialize)]
pub struct IdentifyProperties {
    pub os: Cow<'static, str>,
    pub browser: Cow<'static, str>,
    pub device: Cow<'static, str>,
}

impl IdentifyProperties {
    pub fn new(browser: &'static str, device: &'static str, os: &'static str) -> Self {
        Self {
            os: Cow::Borrowed(os),
            browser: Cow::Borrowed(browser),
            device: Cow::Borrowed(device),
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::new("gateway-rs", "gateway-rs", std::env::consts::OS)
    }
}

/// Payload sent with [`OpCode::Identify`].
#[derive(Debug, Serialize)]
pub struct Identify {
    pub token: Box<str>,
    pub properties: IdentifyProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    pub large_threshold: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<UpdatePresencePayload>,
    pub intents: Intents,
}

/// Payload sent with [`OpCode::Resume`].
#[derive(Debug, Serialize)]
pub struct Resume {
    pub token: Box<str>,
    pub session_id: Box<str>,
    pub seq: u64,
}

/// Presence update, sent either with [`Identify`] or on its own.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdatePresencePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    pub activities: Vec<Activity>,
    pub status: Status,
    pub afk: bool,
}

impl UpdatePresencePayload {
    pub fn new(activities: Vec<Activity>, afk: bool, since: Option<u64>, status: Status) -> Self {
        Self {
            since,
            activities,
            status,
            afk,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ActivityType {
    Playing,
    Streaming,
    Listening,
    Watching,
    Custom,
    Competing,
}

impl From<u8> for ActivityType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Streaming,
            2 => Self::Listening,
            3 => Self::Watching,
            4 => Self::Custom,
            5 => Self::Competing,
            _ => Self::Playing,
        }
    }
}

impl From<ActivityType> for u8 {
    fn from(value: ActivityType) -> Self {
        match value {
            ActivityType::Playing => 0,
            ActivityType::Streaming => 1,
            ActivityType::Listening => 2,
            ActivityType::Watching => 3,
            ActivityType::Custom => 4,
            ActivityType::Competing => 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Online,
    Dnd,
    Idle,
    Invisible,
    Offline,
}

/// `d.application` field of a READY payload.
#[derive(Clone, Debug, Deserialize)]
pub struct PartialApplication {
    pub id: Box<str>,
}

/// The data carried by a READY dispatch.
#[derive(Clone, Debug, Deserialize)]
pub struct Ready {
    pub session_id: Box<str>,
    pub resume_gateway_url: Box<str>,
    pub application: PartialApplication,
    #[serde(default)]
    pub shard: Option<[u64; 2]>,
}

/// Response body of the `GetGatewayBot` REST endpoint; the HTTP call itself
/// is an external collaborator out of this crate's scope.
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayBot {
    pub url: Box<str>,
    pub shards: u64,
    pub session_start_limit: SessionStartLimit,
}

/// `session_start_limit` field of [`GatewayBot`].
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct SessionStartLimit {
    pub total: u64,
    pub remaining: u64,
    pub reset_after: u64,
    pub max_concurrency: u64,
}

#[cfg(test)]
mod tests {
    use super::{Identify, IdentifyProperties, Intents};
    use crate::model::opcode::OpCode;

    use super::Payload;

    #[test]
    fn identify_serializes_without_shard_when_absent() {
        let identify = Identify {
            token: "Bot abc".into(),
            properties: IdentifyProperties::default(),
            compress: Some(true),
            large_threshold: 250,
            shard: None,
            presence: None,
            intents: Intents::GUILDS,
        };

        let json = serde_json::to_value(&Payload::new(OpCode::Identify, identify)).unwrap();

        assert!(json["d"].get("shard").is_none());
        assert_eq!(json["d"]["large_threshold"], 250);
        assert_eq!(json["op"], 2);
    }
}
