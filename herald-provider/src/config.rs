//! Provider configuration schemas.
//!
//! Configuration is validated before any network use: required fields per
//! provider type, semantic checks on values, and strict parsing that rejects
//! unknown fields.

use std::sync::Arc;

use herald_common::Channel;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    esp::EspProvider,
    provider::Provider,
    push::PushProvider,
    sms::SmsProvider,
    smtp::SmtpProvider,
    transport::Transport,
    webhook::WebhookProvider,
};

/// Closed set of provider configurations, externally tagged so a TOML
/// providers table reads as `smtp = { host = ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderConfig {
    Smtp(SmtpConfig),
    Esp(EspConfig),
    Sms(SmsConfig),
    Push(PushConfig),
    Webhook(WebhookConfig),
}

impl ProviderConfig {
    /// The channel this configuration serves.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Smtp(_) | Self::Esp(_) => Channel::Email,
            Self::Sms(_) => Channel::Text,
            Self::Push(_) => Channel::Push,
            Self::Webhook(_) => Channel::Webhook,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Smtp(config) => config.validate(),
            Self::Esp(config) => config.validate(),
            Self::Sms(config) => config.validate(),
            Self::Push(config) => config.validate(),
            Self::Webhook(config) => config.validate(),
        }
    }

    /// Validate and construct the provider over the given transport.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] before any network use if the
    /// configuration is incomplete.
    pub fn build(self, transport: Arc<dyn Transport>) -> Result<Arc<dyn Provider>, ConfigError> {
        Ok(match self {
            Self::Smtp(config) => Arc::new(SmtpProvider::configure(config, transport)?),
            Self::Esp(config) => Arc::new(EspProvider::configure(config, transport)?),
            Self::Sms(config) => Arc::new(SmsProvider::configure(config, transport)?),
            Self::Push(config) => Arc::new(PushProvider::configure(config, transport)?),
            Self::Webhook(config) => Arc::new(WebhookProvider::configure(config, transport)?),
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::MissingField(field))
    } else {
        Ok(())
    }
}

/// SMTP relay credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Use an implicit-TLS connection.
    #[serde(default)]
    pub secure: bool,
    pub auth: SmtpAuth,
    /// Optional subaccount used for routing-header injection.
    #[serde(default)]
    pub subaccount: Option<String>,
}

/// SMTP authentication pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpAuth {
    pub user: String,
    pub pass: String,
}

impl SmtpConfig {
    /// # Errors
    /// Returns a [`ConfigError`] for a missing host, zero port, or empty
    /// credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("host", &self.host)?;
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "port",
                reason: "must be non-zero".to_string(),
            });
        }
        require("auth.user", &self.auth.user)?;
        require("auth.pass", &self.auth.pass)?;
        Ok(())
    }
}

/// API-based email service provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EspConfig {
    pub api_key: String,
    /// Optional endpoint override for self-hosted or regional APIs.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Optional subaccount used for routing-header injection.
    #[serde(default)]
    pub subaccount: Option<String>,
}

impl EspConfig {
    /// # Errors
    /// Returns a [`ConfigError`] for a missing API key or malformed endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("api_key", &self.api_key)?;
        if let Some(endpoint) = &self.endpoint
            && !endpoint.starts_with("https://")
            && !endpoint.starts_with("http://")
        {
            return Err(ConfigError::Invalid {
                field: "endpoint",
                reason: format!("not an http(s) URL: {endpoint}"),
            });
        }
        Ok(())
    }
}

/// SMS gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmsConfig {
    pub api_key: String,
    /// Sender identity presented to recipients.
    pub sender_id: String,
}

impl SmsConfig {
    /// # Errors
    /// Returns a [`ConfigError`] for empty credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("api_key", &self.api_key)?;
        require("sender_id", &self.sender_id)?;
        Ok(())
    }
}

/// Push notification gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    pub api_key: String,
    /// Optional application topic/bundle the tokens belong to.
    #[serde(default)]
    pub topic: Option<String>,
}

impl PushConfig {
    /// # Errors
    /// Returns a [`ConfigError`] for an empty API key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("api_key", &self.api_key)
    }
}

/// Outbound webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub endpoint: String,
    /// Optional shared secret for request signing.
    #[serde(default)]
    pub secret: Option<String>,
}

impl WebhookConfig {
    /// # Errors
    /// Returns a [`ConfigError`] for a missing or malformed endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("endpoint", &self.endpoint)?;
        if !self.endpoint.starts_with("https://") && !self.endpoint.starts_with("http://") {
            return Err(ConfigError::Invalid {
                field: "endpoint",
                reason: format!("not an http(s) URL: {}", self.endpoint),
            });
        }
        Ok(())
    }
}
