//! Outbound webhook provider.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{Channel, Message};

use crate::{
    config::WebhookConfig,
    error::{ConfigError, ConnectionError, SendError},
    provider::{Delivery, Provider, submit_shaped},
    transport::Transport,
};

/// Header carrying the shared secret for receiver-side verification.
pub const TOKEN_HEADER: &str = "X-Webhook-Token";

/// Delivery by HTTP POST to a configured endpoint.
#[derive(Debug)]
pub struct WebhookProvider {
    config: WebhookConfig,
    transport: Arc<dyn Transport>,
}

impl WebhookProvider {
    /// Validate the configuration and bind the provider to a transport.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] before any network use if the
    /// configuration is incomplete.
    pub fn configure(
        config: WebhookConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    fn id(&self) -> &'static str {
        "webhook"
    }

    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    async fn verify(&self) -> Result<(), ConnectionError> {
        self.transport.connect().await.map_err(ConnectionError)
    }

    async fn send(&self, message: &Message) -> Result<Delivery, SendError> {
        let shaped = match &self.config.secret {
            Some(secret) => message.with_header(TOKEN_HEADER, secret),
            None => message.clone(),
        };

        submit_shaped(self.transport.as_ref(), shaped).await
    }
}
