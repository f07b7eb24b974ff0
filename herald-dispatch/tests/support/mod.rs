//! Shared fixtures for dispatch integration tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{Channel, Message};
use herald_dispatch::{MessageSource, ProviderRegistry, RateLimitConfig, RateLimiter, RetryPolicy};
use herald_ledger::SendRecord;
use herald_provider::{
    MockTransport, Provider, PushConfig, PushProvider, SmtpAuth, SmtpConfig, SmtpProvider,
};

/// Renders a trivial message for any record.
#[derive(Debug)]
pub struct StaticSource;

#[async_trait]
impl MessageSource for StaticSource {
    async fn render(&self, record: &SendRecord) -> Option<Message> {
        Some(Message::new(
            format!("user-{}@example.com", record.user_id),
            record.channel,
            "rendered body",
        ))
    }
}

/// An SMTP provider over the given mock transport.
pub fn smtp_provider(transport: Arc<MockTransport>) -> Arc<dyn Provider> {
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
            transport,
        )
        .unwrap(),
    )
}

/// A push provider over the given mock transport.
pub fn push_provider(transport: Arc<MockTransport>) -> Arc<dyn Provider> {
    Arc::new(
        PushProvider::configure(
            PushConfig {
                api_key: "key".to_string(),
                topic: None,
            },
            transport,
        )
        .unwrap(),
    )
}

/// A registry holding a single email provider.
pub fn email_registry(transport: Arc<MockTransport>) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register(smtp_provider(transport));
    Arc::new(registry)
}

/// A retry policy tuned for fast tests: 3 attempts, millisecond backoff,
/// no jitter.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
    }
}

/// A rate limiter that never blocks within a test.
pub fn open_rate_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimitConfig {
        messages_per_second: 10_000.0,
        burst_size: 10_000,
        channel_limits: ahash::AHashMap::default(),
    }))
}

/// A pending email record for campaign 9, user `user_id`, project 7.
pub fn pending_record(user_id: u64) -> SendRecord {
    SendRecord::pending(7, 9, user_id, Channel::Email, chrono::Utc::now())
        .with_reference("message", format!("ref-{user_id}"))
}
