use super::config::Config;
use crate::model::{Intents, UpdatePresencePayload};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// A shard index was out of range of the total shard count.
#[derive(Debug)]
pub struct ShardIdError {
    kind: ShardIdErrorType,
}

impl ShardIdError {
    pub const fn kind(&self) -> &ShardIdErrorType {
        &self.kind
    }
}

impl Display for ShardIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            ShardIdErrorType::IdTooLarge { id, total } => {
                write!(f, "shard ID {id} is not less than the total shard count {total}")
            }
        }
    }
}

impl Error for ShardIdError {}

#[derive(Debug)]
#[non_exhaustive]
pub enum ShardIdErrorType {
    IdTooLarge { id: u64, total: u64 },
}

/// Builder for a session's [`Config`].
#[derive(Debug)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn new(token: impl Into<Box<str>>, intents: Intents) -> Self {
        Self(Config::new(token, intents))
    }

    pub fn build(self) -> Config {
        self.0
    }

    pub fn gateway_url(mut self, url: impl Into<Box<str>>) -> Self {
        self.0.gateway_url = url.into();
        self
    }

    /// # Panics
    ///
    /// Panics if `threshold` is below 50 or above 250, the bounds Discord
    /// enforces on the gateway itself.
    pub fn large_threshold(mut self, threshold: u64) -> Self {
        assert!(
            (50..=250).contains(&threshold),
            "large_threshold must be between 50 and 250"
        );

        self.0.large_threshold = threshold;
        self
    }

    pub fn presence(mut self, presence: UpdatePresencePayload) -> Self {
        self.0.presence = Some(presence);
        self
    }

    /// # Errors
    ///
    /// Returns [`ShardIdErrorType::IdTooLarge`] if `id` is not less than
    /// `total`.
    pub fn shard(mut self, id: u64, total: u64) -> Result<Self, ShardIdError> {
        if id >= total {
            return Err(ShardIdError {
                kind: ShardIdErrorType::IdTooLarge { id, total },
            });
        }

        self.0.shard = [id, total];

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigBuilder;
    use crate::model::Intents;

    #[test]
    fn shard_validates_id_against_total() {
        let builder = ConfigBuilder::new("token", Intents::empty());

        assert!(builder.shard(5, 3).is_err());
    }

    #[test]
    #[should_panic(expected = "large_threshold")]
    fn large_threshold_panics_out_of_range() {
        ConfigBuilder::new("token", Intents::empty()).large_threshold(10);
    }

    #[test]
    fn defaults_are_sensible() {
        let config = ConfigBuilder::new("token", Intents::empty()).build();

        assert_eq!(config.shard(), [0, 1]);
        assert_eq!(config.large_threshold(), 50);
    }
}
