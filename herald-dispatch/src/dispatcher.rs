//! The per-attempt send state machine.

use std::{sync::Arc, time::Duration};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::Utc;
use herald_common::{Message, Signal, internal};
use herald_ledger::{DeliveryEvent, EventKind, LedgerStore, SendRecord, SendState};
use herald_provider::{Delivery, Provider};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    error::DispatchError, rate_limiter::RateLimiter, registry::ProviderRegistry,
    retry::RetryPolicy,
};

/// Failure reason recorded when the throttle retry budget runs out.
const RATE_LIMIT_EXCEEDED: &str = "RateLimitExceeded";

/// Renders the outbound message for a pending send record.
///
/// Rendering (templates, recipient data) belongs to the campaign layer
/// outside this crate; the processor only needs this one seam. Returning
/// `None` leaves the record pending and is surfaced as a warning.
#[async_trait]
pub trait MessageSource: Send + Sync + std::fmt::Debug {
    async fn render(&self, record: &SendRecord) -> Option<Message>;
}

/// The outcome of one dispatch attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Terminal success was recorded (or found already recorded).
    Sent { provider_message_id: Option<String> },
    /// Terminal failure was recorded with the given reason.
    Failed { reason: String },
    /// No available provider for the channel; the record stays pending.
    Deferred,
    /// Shutdown aborted the sequence; the record stays pending.
    Interrupted,
}

/// Drives one send record from `Pending` to a terminal state.
///
/// Transition rules per classified provider outcome:
/// - success: `Sent`, completion time now, provider message id persisted
/// - throttled: backoff and retry; budget exhausted means `Failed` with
///   reason `RateLimitExceeded`
/// - transient: bounded retry with backoff; exhaustion means `Failed`
/// - fatal: immediate `Failed`, no retry
///
/// Terminal writes go through the ledger's conflict-ignoring upsert, so a
/// retry racing a reconciler-derived event cannot produce two differing
/// terminal rows; the losing writer discards silently.
#[derive(Debug)]
pub struct Dispatcher {
    ledger: Arc<dyn LedgerStore>,
    providers: Arc<ProviderRegistry>,
    retry_policy: RetryPolicy,
    rate_limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        providers: Arc<ProviderRegistry>,
        retry_policy: RetryPolicy,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            ledger,
            providers,
            retry_policy,
            rate_limiter,
        }
    }

    /// Dispatch one pending record through its channel provider.
    ///
    /// Suspends only at network I/O and backoff delays, both cancellable:
    /// a shutdown signal aborts the wait and leaves the record pending.
    ///
    /// # Errors
    /// Returns an error only on ledger storage failure; provider failures
    /// are absorbed into the state machine.
    pub async fn dispatch(
        &self,
        record: &SendRecord,
        message: &Message,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Result<AttemptOutcome, DispatchError> {
        let Some(provider) = self.providers.get_available(record.channel) else {
            debug!(
                key = %record.key(),
                channel = %record.channel,
                "No available provider, deferring send"
            );
            return Ok(AttemptOutcome::Deferred);
        };

        // Local pacing. Waiting for a token is not a delivery attempt and
        // never consumes the retry budget.
        while let Err(wait) = self.rate_limiter.check_rate_limit(record.channel) {
            if !sleep_cancellable(wait, shutdown).await {
                return Ok(AttemptOutcome::Interrupted);
            }
        }

        let mut attempts = 0u32;
        loop {
            let result = tokio::select! {
                result = provider.send(message) => result,
                _ = shutdown.recv() => {
                    internal!(level = DEBUG, "Shutdown during send, leaving record pending");
                    return Ok(AttemptOutcome::Interrupted);
                }
            };
            attempts += 1;

            match result {
                Ok(delivery) => {
                    return self.record_sent(record, provider.as_ref(), delivery).await;
                }
                Err(error) => {
                    if !error.is_fatal() && self.retry_policy.should_retry(attempts) {
                        let delay = self.retry_policy.backoff_delay(attempts);
                        debug!(
                            key = %record.key(),
                            attempt = attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            %error,
                            "Send failed, backing off before retry"
                        );
                        if !sleep_cancellable(delay, shutdown).await {
                            return Ok(AttemptOutcome::Interrupted);
                        }
                        continue;
                    }

                    let reason = if error.is_throttled() {
                        RATE_LIMIT_EXCEEDED.to_string()
                    } else {
                        error.to_string()
                    };
                    return self.record_failed(record, provider.as_ref(), reason).await;
                }
            }
        }
    }

    async fn record_sent(
        &self,
        record: &SendRecord,
        provider: &dyn Provider,
        delivery: Delivery,
    ) -> Result<AttemptOutcome, DispatchError> {
        let now = Utc::now();
        let key = record.key();

        let metadata = delivery.detail.as_ref().map(|detail| {
            let mut meta = AHashMap::new();
            meta.insert("result".to_string(), detail.clone());
            meta
        });

        let won = self
            .ledger
            .mark_terminal(&key, SendState::Sent, now, metadata)
            .await?;
        if !won {
            // A racing writer already recorded a terminal state; our write
            // is discarded silently.
            debug!(key = %key, "Terminal state already recorded, discarding");
        }

        self.ledger
            .insert_events_ignore(vec![DeliveryEvent {
                project_id: record.project_id,
                campaign_id: record.campaign_id,
                user_id: record.user_id,
                channel: record.channel,
                event: EventKind::Sent,
                reference_type: record.reference_type.clone(),
                reference_id: record.reference_id.clone(),
                provider_id: Some(provider.id().to_string()),
                provider_message_id: delivery.provider_message_id.clone(),
                meta: delivery.detail.clone().map(|detail| {
                    let mut meta = AHashMap::new();
                    meta.insert("result".to_string(), detail);
                    meta
                }),
                created_at: now,
                updated_at: now,
            }])
            .await?;

        Ok(AttemptOutcome::Sent {
            provider_message_id: delivery.provider_message_id,
        })
    }

    async fn record_failed(
        &self,
        record: &SendRecord,
        provider: &dyn Provider,
        reason: String,
    ) -> Result<AttemptOutcome, DispatchError> {
        let now = Utc::now();
        let key = record.key();

        warn!(key = %key, reason = %reason, "Send failed terminally");

        let mut metadata = AHashMap::new();
        metadata.insert("reason".to_string(), reason.clone());

        let won = self
            .ledger
            .mark_terminal(&key, SendState::Failed, now, Some(metadata))
            .await?;
        if !won {
            debug!(key = %key, "Terminal state already recorded, discarding");
        }

        let mut meta = AHashMap::new();
        meta.insert("result".to_string(), reason.clone());

        self.ledger
            .insert_events_ignore(vec![DeliveryEvent {
                project_id: record.project_id,
                campaign_id: record.campaign_id,
                user_id: record.user_id,
                channel: record.channel,
                event: EventKind::Failed,
                reference_type: record.reference_type.clone(),
                reference_id: record.reference_id.clone(),
                provider_id: Some(provider.id().to_string()),
                provider_message_id: None,
                meta: Some(meta),
                created_at: now,
                updated_at: now,
            }])
            .await?;

        Ok(AttemptOutcome::Failed { reason })
    }
}

/// Sleep for `duration`, aborting early on shutdown.
///
/// Returns `true` if the full duration elapsed, `false` on shutdown.
async fn sleep_cancellable(
    duration: Duration,
    shutdown: &mut broadcast::Receiver<Signal>,
) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        _ = shutdown.recv() => false,
    }
}
