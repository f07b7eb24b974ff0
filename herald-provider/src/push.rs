//! Push notification provider.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{Channel, Message};

use crate::{
    config::PushConfig,
    error::{ConfigError, ConnectionError, SendError},
    provider::{Delivery, Provider, submit_shaped},
    transport::Transport,
};

/// Header naming the application topic the device token belongs to.
pub const TOPIC_HEADER: &str = "X-Push-Topic";

/// Push delivery through a notification gateway.
#[derive(Debug)]
pub struct PushProvider {
    config: PushConfig,
    transport: Arc<dyn Transport>,
}

impl PushProvider {
    /// Validate the configuration and bind the provider to a transport.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] before any network use if the
    /// configuration is incomplete.
    pub fn configure(
        config: PushConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Provider for PushProvider {
    fn id(&self) -> &'static str {
        "push"
    }

    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn verify(&self) -> Result<(), ConnectionError> {
        self.transport.connect().await.map_err(ConnectionError)
    }

    async fn send(&self, message: &Message) -> Result<Delivery, SendError> {
        let shaped = match &self.config.topic {
            Some(topic) => message.with_header(TOPIC_HEADER, topic),
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

    #[tokio::test]
    async fn topic_header_follows_config() {
        let transport = Arc::new(MockTransport::new());
        let provider = PushProvider::configure(
            PushConfig {
                api_key: "key".to_string(),
                topic: Some("com.example.app".to_string()),
            },
            transport.clone(),
        )
        .unwrap();

        provider
            .send(&Message::new("device-token", Channel::Push, "{\"alert\":\"hi\"}"))
            .await
            .unwrap();

        assert_eq!(
            transport.requests()[0]
                .headers
                .get(TOPIC_HEADER)
                .map(String::as_str),
            Some("com.example.app")
        );
    }

    #[tokio::test]
    async fn invalid_token_is_fatal() {
        let transport = Arc::new(MockTransport::new().with_outcome(Err(
            TransportError::message("invalid device token").with_status(410),
        )));
        let provider = PushProvider::configure(
            PushConfig {
                api_key: "key".to_string(),
                topic: None,
            },
            transport,
        )
        .unwrap();

        let error = provider
            .send(&Message::new("device-token", Channel::Push, "{}"))
            .await
            .unwrap_err();
        assert!(error.is_fatal());
    }
}
