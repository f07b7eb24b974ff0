//! Message rendering from pre-rendered record metadata.

use async_trait::async_trait;
use herald_common::Message;
use herald_dispatch::MessageSource;
use herald_ledger::SendRecord;
use tracing::warn;

/// Renders messages from content the enqueueing layer stored on the record.
///
/// Campaign templating lives outside this system; the enqueueing layer
/// writes the rendered content into record metadata under `recipient`,
/// `body` and optionally `subject`. Records without that content cannot be
/// dispatched and are left pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordMessageSource;

#[async_trait]
impl MessageSource for RecordMessageSource {
    async fn render(&self, record: &SendRecord) -> Option<Message> {
        let metadata = record.metadata.as_ref()?;
        let Some(recipient) = metadata.get("recipient") else {
            warn!(key = %record.key(), "Record metadata has no recipient");
            return None;
        };
        let Some(body) = metadata.get("body") else {
            warn!(key = %record.key(), "Record metadata has no body");
            return None;
        };

        let mut message = Message::new(recipient.clone(), record.channel, body.clone());
        if let Some(subject) = metadata.get("subject") {
            message = message.with_subject(subject.clone());
        }
        Some(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ahash::AHashMap;
    use chrono::Utc;
    use herald_common::Channel;

    use super::*;

    #[tokio::test]
    async fn renders_from_metadata() {
        let mut record = SendRecord::pending(1, 2, 3, Channel::Email, Utc::now());
        let mut metadata = AHashMap::new();
        metadata.insert("recipient".to_string(), "user@example.com".to_string());
        metadata.insert("subject".to_string(), "March update".to_string());
        metadata.insert("body".to_string(), "hello".to_string());
        record.metadata = Some(metadata);

        let message = RecordMessageSource.render(&record).await.unwrap();
        assert_eq!(message.recipient, "user@example.com");
        assert_eq!(message.subject.as_deref(), Some("March update"));
        assert_eq!(message.channel, Channel::Email);
    }

    #[tokio::test]
    async fn missing_content_yields_none() {
        let record = SendRecord::pending(1, 2, 3, Channel::Email, Utc::now());
        assert!(RecordMessageSource.render(&record).await.is_none());
    }
}
