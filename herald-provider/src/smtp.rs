//! SMTP relay provider.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{Channel, Message};

use crate::{
    config::SmtpConfig,
    error::{ConfigError, ConnectionError, SendError},
    provider::{Delivery, Provider, submit_shaped},
    transport::Transport,
};

/// Routing header injected when a subaccount is configured.
pub const SUBACCOUNT_HEADER: &str = "X-Relay-Subaccount";

/// Email delivery through an SMTP relay.
#[derive(Debug)]
pub struct SmtpProvider {
    config: SmtpConfig,
    transport: Arc<dyn Transport>,
}

impl SmtpProvider {
    /// Validate the configuration and bind the provider to a transport.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] before any network use if the
    /// configuration is incomplete.
    pub fn configure(
        config: SmtpConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Provider for SmtpProvider {
    fn id(&self) -> &'static str {
        "smtp"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn verify(&self) -> Result<(), ConnectionError> {
        self.transport.connect().await.map_err(ConnectionError)
    }

    async fn send(&self, message: &Message) -> Result<Delivery, SendError> {
        // Subaccount routing is derived purely from config and applied to a
        // shaped copy; the caller's message is never mutated.
        let shaped = match &self.config.subaccount {
            Some(subaccount) => message.with_header(SUBACCOUNT_HEADER, subaccount),
            None => message.clone(),
        };

        submit_shaped(self.transport.as_ref(), shaped).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError, TransportResponse};

    fn config(subaccount: Option<&str>) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            secure: true,
            auth: crate::config::SmtpAuth {
                user: "relay".to_string(),
                pass: "hunter2".to_string(),
            },
            subaccount: subaccount.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn injects_subaccount_header_without_mutating_input() {
        let transport = Arc::new(MockTransport::new());
        let provider = SmtpProvider::configure(config(Some("42")), transport.clone()).unwrap();

        let message = Message::new("user@example.com", Channel::Email, "hello");
        provider.send(&message).await.unwrap();

        assert!(message.headers.is_empty());
        let submitted = transport.requests();
        assert_eq!(
            submitted[0].headers.get(SUBACCOUNT_HEADER).map(String::as_str),
            Some("42")
        );
    }

    #[tokio::test]
    async fn no_subaccount_means_no_header() {
        let transport = Arc::new(MockTransport::new());
        let provider = SmtpProvider::configure(config(None), transport.clone()).unwrap();

        provider
            .send(&Message::new("user@example.com", Channel::Email, "hello"))
            .await
            .unwrap();

        assert!(transport.requests()[0].headers.is_empty());
    }

    #[tokio::test]
    async fn throttle_classification_passes_through() {
        let transport = Arc::new(
            MockTransport::new()
                .with_outcome(Err(TransportError::message("slow down").with_status(429))),
        );
        let provider = SmtpProvider::configure(config(Some("42")), transport).unwrap();

        let error = provider
            .send(&Message::new("user@example.com", Channel::Email, "hello"))
            .await
            .unwrap_err();
        assert!(error.is_throttled());
    }

    #[tokio::test]
    async fn delivery_carries_provider_message_id() {
        let transport = Arc::new(MockTransport::new().with_outcome(Ok(TransportResponse {
            message_id: Some("smtp-abc".to_string()),
            detail: Some("250 OK".to_string()),
        })));
        let provider = SmtpProvider::configure(config(None), transport).unwrap();

        let delivery = provider
            .send(&Message::new("user@example.com", Channel::Email, "hello"))
            .await
            .unwrap();
        assert_eq!(delivery.provider_message_id.as_deref(), Some("smtp-abc"));
        assert_eq!(delivery.detail.as_deref(), Some("250 OK"));
    }

    #[tokio::test]
    async fn verify_reports_connection_errors() {
        let transport = Arc::new(
            MockTransport::new()
                .refusing_connections(TransportError::message("connection refused")),
        );
        let provider = SmtpProvider::configure(config(None), transport).unwrap();
        assert!(provider.verify().await.is_err());
    }

    #[test]
    fn configure_rejects_invalid_config() {
        let mut bad = config(None);
        bad.host = String::new();
        let result = SmtpProvider::configure(bad, Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(ConfigError::MissingField("host"))));
    }
}
