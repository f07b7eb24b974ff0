//! SMS gateway provider.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{Channel, Message};

use crate::{
    config::SmsConfig,
    error::{ConfigError, ConnectionError, SendError},
    provider::{Delivery, Provider, submit_shaped},
    transport::Transport,
};

/// Header carrying the configured sender identity.
pub const SENDER_ID_HEADER: &str = "X-Sender-Id";

/// Text message delivery through an SMS gateway.
#[derive(Debug)]
pub struct SmsProvider {
    config: SmsConfig,
    transport: Arc<dyn Transport>,
}

impl SmsProvider {
    /// Validate the configuration and bind the provider to a transport.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] before any network use if the
    /// configuration is incomplete.
    pub fn configure(config: SmsConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Provider for SmsProvider {
    fn id(&self) -> &'static str {
        "sms"
    }

    fn channel(&self) -> Channel {
        Channel::Text
    }

    async fn verify(&self) -> Result<(), ConnectionError> {
        self.transport.connect().await.map_err(ConnectionError)
    }

    async fn send(&self, message: &Message) -> Result<Delivery, SendError> {
        let shaped = message.with_header(SENDER_ID_HEADER, &self.config.sender_id);
        submit_shaped(self.transport.as_ref(), shaped).await
    }
}
