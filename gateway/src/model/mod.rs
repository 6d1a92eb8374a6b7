//! The minimal wire model the session runtime needs.
//!
//! This is a deliberately small subset of Discord's full REST/event record
//! catalogue; building that catalogue out is explicitly out of scope (see
//! the crate's top-level documentation).

mod close_code;
mod intents;
mod opcode;
mod payload;

pub use self::{
    close_code::{CloseCode, CloseCodeConversionError},
    intents::Intents,
    opcode::OpCode,
    payload::{
        Activity, ActivityType, GatewayBot, GatewayEvent, Identify, IdentifyProperties,
        PartialApplication, Payload, Ready, Resume, SessionStartLimit, Status,
        UpdatePresencePayload,
    },
};
