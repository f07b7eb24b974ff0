//! Registry of configured providers, one per channel.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use herald_common::Channel;
use herald_provider::Provider;
use tracing::{info, warn};

#[derive(Debug)]
struct Registered {
    provider: Arc<dyn Provider>,
    /// Cleared when a verify check fails; the dispatcher then defers sends
    /// on this channel instead of crashing or burning the retry budget.
    available: AtomicBool,
}

/// Providers indexed by the channel they serve.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: DashMap<Channel, Registered>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for its channel, replacing any previous one.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        self.providers.insert(
            provider.channel(),
            Registered {
                provider,
                available: AtomicBool::new(true),
            },
        );
    }

    /// The provider for a channel, if registered and currently available.
    #[must_use]
    pub fn get_available(&self, channel: Channel) -> Option<Arc<dyn Provider>> {
        self.providers.get(&channel).and_then(|entry| {
            entry
                .available
                .load(Ordering::SeqCst)
                .then(|| Arc::clone(&entry.provider))
        })
    }

    /// Whether any provider is registered for the channel.
    #[must_use]
    pub fn has_provider(&self, channel: Channel) -> bool {
        self.providers.contains_key(&channel)
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run every provider's connectivity check, updating availability.
    ///
    /// A failed check marks the provider unavailable and is reported, never
    /// propagated; returns the number of providers that verified cleanly.
    pub async fn verify_all(&self) -> usize {
        let mut healthy = 0;
        for entry in self.providers.iter() {
            match entry.provider.verify().await {
                Ok(()) => {
                    entry.available.store(true, Ordering::SeqCst);
                    healthy += 1;
                    info!(
                        channel = %entry.provider.channel(),
                        provider = entry.provider.id(),
                        "Provider verified"
                    );
                }
                Err(error) => {
                    entry.available.store(false, Ordering::SeqCst);
                    warn!(
                        channel = %entry.provider.channel(),
                        provider = entry.provider.id(),
                        %error,
                        "Provider failed verification, marked unavailable"
                    );
                }
            }
        }
        healthy
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_provider::{
        MockTransport, SmtpAuth, SmtpConfig, SmtpProvider, TransportError, WebhookConfig,
        WebhookProvider,
    };

    use super::*;

    fn smtp_provider(transport: MockTransport) -> Arc<dyn Provider> {
        Arc::new(
            SmtpProvider::configure(
                SmtpConfig {
                    host: "smtp.example.com".to_string(),
                    port: 587,
                    secure: true,
                    auth: SmtpAuth {
                        user: "relay".to_string(),
                        pass: "hunter2".to_string(),
                    },
                    subaccount: None,
                },
                Arc::new(transport),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn failed_verify_marks_unavailable() {
        let registry = ProviderRegistry::new();
        registry.register(smtp_provider(
            MockTransport::new().refusing_connections(TransportError::message("auth failed")),
        ));

        assert!(registry.get_available(Channel::Email).is_some());
        assert_eq!(registry.verify_all().await, 0);
        assert!(registry.get_available(Channel::Email).is_none());
        assert!(registry.has_provider(Channel::Email));
    }

    #[tokio::test]
    async fn verify_counts_healthy_providers() {
        let registry = ProviderRegistry::new();
        registry.register(smtp_provider(MockTransport::new()));
        registry.register(Arc::new(
            WebhookProvider::configure(
                WebhookConfig {
                    endpoint: "https://hooks.example.com".to_string(),
                    secret: None,
                },
                Arc::new(MockTransport::new()),
            )
            .unwrap(),
        ));

        assert_eq!(registry.verify_all().await, 2);
        assert!(registry.get_available(Channel::Webhook).is_some());
        assert!(registry.get_available(Channel::Push).is_none());
    }
}
