//! API-based email service provider.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{Channel, Message};

use crate::{
    config::EspConfig,
    error::{ConfigError, ConnectionError, SendError},
    provider::{Delivery, Provider, submit_shaped},
    smtp::SUBACCOUNT_HEADER,
    transport::Transport,
};

/// Email delivery through an ESP HTTP API.
///
/// SMTP-family shaping applies here too: the subaccount routing header is
/// injected when configured, since ESPs honor the same routing convention on
/// their API surface.
#[derive(Debug)]
pub struct EspProvider {
    config: EspConfig,
    transport: Arc<dyn Transport>,
}

impl EspProvider {
    /// Validate the configuration and bind the provider to a transport.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] before any network use if the
    /// configuration is incomplete.
    pub fn configure(config: EspConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Provider for EspProvider {
    fn id(&self) -> &'static str {
        "esp"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn verify(&self) -> Result<(), ConnectionError> {
        self.transport.connect().await.map_err(ConnectionError)
    }

    async fn send(&self, message: &Message) -> Result<Delivery, SendError> {
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
    use crate::transport::{MockTransport, TransportError};

    fn config() -> EspConfig {
        EspConfig {
            api_key: "key-123".to_string(),
            endpoint: None,
            subaccount: Some("marketing".to_string()),
        }
    }

    #[tokio::test]
    async fn shapes_like_the_smtp_family() {
        let transport = Arc::new(MockTransport::new());
        let provider = EspProvider::configure(config(), transport.clone()).unwrap();

        provider
            .send(&Message::new("user@example.com", Channel::Email, "hello"))
            .await
            .unwrap();

        assert_eq!(
            transport.requests()[0]
                .headers
                .get(SUBACCOUNT_HEADER)
                .map(String::as_str),
            Some("marketing")
        );
    }

    #[tokio::test]
    async fn fatal_classification_passes_through() {
        let transport = Arc::new(MockTransport::new().with_outcome(Err(
            TransportError::message("suppressed recipient").with_status(400),
        )));
        let provider = EspProvider::configure(config(), transport).unwrap();

        let error = provider
            .send(&Message::new("user@example.com", Channel::Email, "hello"))
            .await
            .unwrap_err();
        assert!(error.is_fatal());
    }

    #[test]
    fn configure_rejects_empty_api_key() {
        let mut bad = config();
        bad.api_key = "  ".to_string();
        assert!(matches!(
            EspProvider::configure(bad, Arc::new(MockTransport::new())),
            Err(ConfigError::MissingField("api_key"))
        ));
    }
}
