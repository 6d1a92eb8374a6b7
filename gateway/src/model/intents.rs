use bitflags::bitflags;
use serde::{
    de::{Deserialize, Deserializer},
    ser::{Serialize, Serializer},
};

bitflags! {
    /// Gateway intents, a bitmask of event families a session subscribes to.
    ///
    /// <https://discord.com/developers/docs/topics/gateway#gateway-intents>
    pub struct Intents: u64 {
        /// Guild related events, except for members and presences.
        const GUILDS = 1;
        /// Guild member events.
        ///
        /// This is a privileged intent that must be allowlisted.
        const GUILD_MEMBERS = 1 << 1;
        /// Guild ban events.
        const GUILD_BANS = 1 << 2;
        /// Guild emoji and sticker events.
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        /// Guild integration events.
        const GUILD_INTEGRATIONS = 1 << 4;
        /// Guild webhook events.
        const GUILD_WEBHOOKS = 1 << 5;
        /// Guild invite events.
        const GUILD_INVITES = 1 << 6;
        /// Guild voice state events.
        const GUILD_VOICE_STATES = 1 << 7;
        /// Guild presence events.
        ///
        /// This is a privileged intent that must be allowlisted.
        const GUILD_PRESENCES = 1 << 8;
        /// Guild message events.
        const GUILD_MESSAGES = 1 << 9;
        /// Guild message reaction events.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Guild message typing events.
        const GUILD_MESSAGE_TYPING = 1 << 11;
        /// Direct message events.
        const DIRECT_MESSAGES = 1 << 12;
        /// Direct message reaction events.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Direct message typing events.
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        /// Message content.
        ///
        /// This is a privileged intent that must be allowlisted.
        const MESSAGE_CONTENT = 1 << 15;
        /// Guild scheduled event events.
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_bits_truncate(u64::deserialize(deserializer)?))
    }
}

impl Serialize for Intents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::Intents;

    #[test]
    fn serializes_as_integer() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;

        assert_eq!(serde_json::to_string(&intents).unwrap(), "513");
    }

    #[test]
    fn privileged_intents_are_individually_addressable() {
        assert!(Intents::GUILD_MEMBERS.bits() != Intents::GUILD_PRESENCES.bits());
    }
}
