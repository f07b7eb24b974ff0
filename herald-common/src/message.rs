//! The ephemeral message value handed to a provider for one dispatch attempt.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::Channel;

/// A rendered message bound for one recipient on one channel.
///
/// Messages are constructed per dispatch attempt and never persisted. The
/// subject is only meaningful for channels that have one (email); other
/// channels carry their payload in `body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Recipient address in channel-specific form (email address, phone
    /// number, device token, or webhook URL).
    pub recipient: String,
    /// The channel this message is to be delivered on.
    pub channel: Channel,
    /// Subject line, where the channel supports one.
    pub subject: Option<String>,
    /// Rendered message body or payload.
    pub body: String,
    /// Transport headers. Providers may add channel-specific entries.
    #[serde(default)]
    pub headers: AHashMap<String, String>,
    /// Opaque per-send metadata carried through to delivery records.
    #[serde(default)]
    pub metadata: AHashMap<String, String>,
}

impl Message {
    /// Create a message with an empty header and metadata set.
    #[must_use]
    pub fn new(recipient: impl Into<String>, channel: Channel, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            channel,
            subject: None,
            body: body.into(),
            headers: AHashMap::new(),
            metadata: AHashMap::new(),
        }
    }

    /// Set the subject line.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Return a shaped copy of this message with one header added.
    ///
    /// The original message is left untouched; providers use this to inject
    /// routing headers without mutating the caller's value.
    #[must_use]
    pub fn with_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut shaped = self.clone();
        shaped.headers.insert(name.into(), value.into());
        shaped
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn header_shaping_is_non_destructive() {
        let original = Message::new("user@example.com", Channel::Email, "hello");
        let shaped = original.with_header("X-Relay-Subaccount", "42");

        assert!(original.headers.is_empty());
        assert_eq!(
            shaped.headers.get("X-Relay-Subaccount").map(String::as_str),
            Some("42")
        );
        assert_eq!(shaped.recipient, original.recipient);
        assert_eq!(shaped.body, original.body);
    }

    #[test]
    fn subject_is_optional() {
        let message = Message::new("+15550100", Channel::Text, "otp 123456");
        assert!(message.subject.is_none());

        let with_subject = message.clone().with_subject("ignored by sms");
        assert_eq!(with_subject.subject.as_deref(), Some("ignored by sms"));
    }
}
