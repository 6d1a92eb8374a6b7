//! Function wrappers for deserializing and serializing gateway payloads.

use crate::model::GatewayEvent;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Parsing a gateway frame into a [`GatewayEvent`] failed.
#[derive(Debug)]
pub struct GatewayEventParsingError {
    kind: GatewayEventParsingErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl GatewayEventParsingError {
    /// Immutable reference to the type of error that occurred.
    pub const fn kind(&self) -> &GatewayEventParsingErrorType {
        &self.kind
    }
}

impl Display for GatewayEventParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            GatewayEventParsingErrorType::Deserializing => {
                f.write_str("deserializing gateway event as json failed")
            }
            GatewayEventParsingErrorType::PayloadInvalid => {
                f.write_str("payload is missing a required field or has an unrecognized opcode")
            }
        }
    }
}

impl Error for GatewayEventParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`GatewayEventParsingError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum GatewayEventParsingErrorType {
    /// Deserializing the payload from JSON failed.
    Deserializing,
    /// The payload didn't have the shape a gateway frame must have, such as
    /// a dispatch frame missing its `t`/`s` fields.
    PayloadInvalid,
}

#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<Box<str>>,
}

/// Deserialize a typed value from a JSON byte slice.
///
/// # Errors
///
/// Returns a [`GatewayEventParsingErrorType::Deserializing`] error if the
/// payload failed to deserialize as `T`.
pub fn from_slice<T: DeserializeOwned>(json: &[u8]) -> Result<T, GatewayEventParsingError> {
    serde_json::from_slice(json).map_err(|source| {
        tracing::error!("invalid JSON: {}", String::from_utf8_lossy(json));

        GatewayEventParsingError {
            kind: GatewayEventParsingErrorType::Deserializing,
            source: Some(Box::new(source)),
        }
    })
}

/// Serialize a value to a JSON byte vector, for transmission as a single
/// binary websocket message.
///
/// # Errors
///
/// Returns an error if serialization fails; this should only happen for
/// non-UTF8 strings since the rest of the wire model is plain data.
pub fn to_vec(value: &impl Serialize) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

/// Parse a raw gateway frame into a [`GatewayEvent`].
///
/// # Errors
///
/// Returns a [`GatewayEventParsingErrorType::Deserializing`] error if the
/// payload isn't valid JSON.
///
/// Returns a [`GatewayEventParsingErrorType::PayloadInvalid`] error if the
/// payload is valid JSON but doesn't have the shape a gateway frame of its
/// opcode must have.
pub fn parse(json: &[u8]) -> Result<GatewayEvent, GatewayEventParsingError> {
    let invalid = || GatewayEventParsingError {
        kind: GatewayEventParsingErrorType::PayloadInvalid,
        source: None,
    };

    let raw: RawFrame = from_slice(json)?;

    let event = match raw.op {
        0 => {
            let seq = raw.s.ok_or_else(invalid)?;
            let name = raw.t.ok_or_else(invalid)?;

            GatewayEvent::Dispatch(seq, name, raw.d)
        }
        1 => GatewayEvent::Heartbeat,
        7 => GatewayEvent::Reconnect,
        9 => {
            let resumable = serde_json::from_value(raw.d).map_err(|source| {
                GatewayEventParsingError {
                    kind: GatewayEventParsingErrorType::PayloadInvalid,
                    source: Some(Box::new(source)),
                }
            })?;

            GatewayEvent::InvalidSession(resumable)
        }
        10 => {
            #[derive(Deserialize)]
            struct Hello {
                heartbeat_interval: u64,
            }

            let hello: Hello = serde_json::from_value(raw.d).map_err(|source| {
                GatewayEventParsingError {
                    kind: GatewayEventParsingErrorType::PayloadInvalid,
                    source: Some(Box::new(source)),
                }
            })?;

            GatewayEvent::Hello(hello.heartbeat_interval)
        }
        11 => GatewayEvent::HeartbeatAck,
        _ => return Err(invalid()),
    };

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::model::GatewayEvent;

    #[test]
    fn parses_hello() {
        let json = br#"{"op":10,"d":{"heartbeat_interval":45000}}"#;

        match parse(json).unwrap() {
            GatewayEvent::Hello(interval) => assert_eq!(interval, 45000),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_dispatch() {
        let json = br#"{"op":0,"s":1,"t":"READY","d":{"session_id":"abc"}}"#;

        match parse(json).unwrap() {
            GatewayEvent::Dispatch(seq, name, data) => {
                assert_eq!(seq, 1);
                assert_eq!(&*name, "READY");
                assert_eq!(data["session_id"], "abc");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn dispatch_without_sequence_is_invalid() {
        let json = br#"{"op":0,"t":"READY","d":{}}"#;

        assert!(parse(json).is_err());
    }

    #[test]
    fn parses_invalid_session() {
        let json = br#"{"op":9,"d":true}"#;

        match parse(json).unwrap() {
            GatewayEvent::InvalidSession(resumable) => assert!(resumable),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_opcode_is_invalid() {
        let json = br#"{"op":99,"d":null}"#;

        assert!(parse(json).is_err());
    }
}
