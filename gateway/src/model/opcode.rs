use serde_repr::{Deserialize_repr, Serialize_repr};

/// Gateway opcodes.
///
/// <https://discord.com/developers/docs/topics/opcodes-and-status-codes#gateway-opcodes>
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched.
    Dispatch = 0,
    /// Either side requests (or responds to) a heartbeat.
    Heartbeat = 1,
    /// Start a new session.
    Identify = 2,
    /// Resume a previous session that was disconnected.
    Resume = 6,
    /// Server is indicating the client should reconnect and resume.
    Reconnect = 7,
    /// Session has been invalidated; the `d` field indicates whether it may
    /// be resumed.
    InvalidSession = 9,
    /// Sent immediately after connecting, contains the heartbeat interval.
    Hello = 10,
    /// A heartbeat was acknowledged.
    HeartbeatAck = 11,
}

#[cfg(test)]
mod tests {
    use super::OpCode;

    #[test]
    fn roundtrip() {
        for (code, value) in [
            (OpCode::Dispatch, 0),
            (OpCode::Heartbeat, 1),
            (OpCode::Identify, 2),
            (OpCode::Resume, 6),
            (OpCode::Reconnect, 7),
            (OpCode::InvalidSession, 9),
            (OpCode::Hello, 10),
            (OpCode::HeartbeatAck, 11),
        ] {
            assert_eq!(serde_json::to_string(&code).unwrap(), value.to_string());
        }
    }
}
