//! Delivery channels supported by the pipeline.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A delivery medium for outbound messages.
///
/// The wire names (`email`, `text`, `push`, `in_app`, `webhook`) are the
/// canonical identifiers used in activity-log entry names and persisted
/// ledger rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Text,
    Push,
    InApp,
    Webhook,
}

impl Channel {
    /// All channels, in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Email,
        Self::Text,
        Self::Push,
        Self::InApp,
        Self::Webhook,
    ];

    /// The canonical wire name for this channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Text => "text",
            Self::Push => "push",
            Self::InApp => "in_app",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown channel: {0}")]
pub struct ChannelParseError(pub String);

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "text" => Ok(Self::Text),
            "push" => Ok(Self::Push),
            "in_app" => Ok(Self::InApp),
            "webhook" => Ok(Self::Webhook),
            other => Err(ChannelParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for channel in Channel::ALL {
            let parsed: Channel = channel.as_str().parse().expect("canonical name parses");
            assert_eq!(parsed, channel);
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!("sms".parse::<Channel>().is_err());
        assert!("EMAIL".parse::<Channel>().is_err());
        assert!("".parse::<Channel>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Channel::InApp).expect("serializes");
        assert_eq!(json, "\"in_app\"");
    }
}
