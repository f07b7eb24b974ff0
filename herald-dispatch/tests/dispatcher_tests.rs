//! Integration tests for the dispatch state machine.

#![allow(clippy::unwrap_used)]

mod support;

use std::sync::Arc;

use chrono::Utc;
use herald_common::{Channel, Message, Signal};
use herald_dispatch::{AttemptOutcome, Dispatcher, ProviderRegistry, RetryPolicy};
use herald_ledger::{EventKind, LedgerStore, MemoryLedger, SendState};
use herald_provider::{MockTransport, TransportError, TransportResponse};
use tokio::sync::broadcast;

use support::{email_registry, fast_retry, open_rate_limiter, pending_record};

fn dispatcher(
    ledger: Arc<MemoryLedger>,
    registry: Arc<ProviderRegistry>,
    retry: RetryPolicy,
) -> Dispatcher {
    Dispatcher::new(ledger, registry, retry, open_rate_limiter())
}

async fn seeded_ledger(user_id: u64) -> (Arc<MemoryLedger>, herald_ledger::SendRecord) {
    let ledger = Arc::new(MemoryLedger::new());
    let record = pending_record(user_id);
    ledger.upsert_ignore(record.clone()).await.unwrap();
    (ledger, record)
}

#[tokio::test]
async fn success_reaches_sent_with_completion_time() {
    let transport = Arc::new(MockTransport::new().with_outcome(Ok(TransportResponse {
        message_id: Some("smtp-1".to_string()),
        detail: Some("250 OK".to_string()),
    })));
    let (ledger, record) = seeded_ledger(1).await;
    let dispatcher = dispatcher(ledger.clone(), email_registry(transport), fast_retry());
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-1@example.com", Channel::Email, "hi");
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    assert_eq!(
        outcome,
        AttemptOutcome::Sent {
            provider_message_id: Some("smtp-1".to_string())
        }
    );

    let stored = ledger.record(&record.key()).await.unwrap().unwrap();
    assert_eq!(stored.state, SendState::Sent);
    assert!(stored.completed_at.is_some());

    let events = ledger.events_for_project(7, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventKind::Sent);
    assert_eq!(events[0].provider_message_id.as_deref(), Some("smtp-1"));
    assert_eq!(events[0].provider_id.as_deref(), Some("smtp"));
}

#[tokio::test]
async fn persistent_throttle_exhausts_budget_as_rate_limit_exceeded() {
    let transport = Arc::new(MockTransport::new());
    for _ in 0..3 {
        transport.push_outcome(Err(TransportError::message("slow down").with_status(429)));
    }
    let (ledger, record) = seeded_ledger(2).await;
    let dispatcher = dispatcher(ledger.clone(), email_registry(transport.clone()), fast_retry());
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-2@example.com", Channel::Email, "hi");
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    assert_eq!(
        outcome,
        AttemptOutcome::Failed {
            reason: "RateLimitExceeded".to_string()
        }
    );
    // The full retry budget was spent against the transport.
    assert_eq!(transport.request_count(), 3);

    let stored = ledger.record(&record.key()).await.unwrap().unwrap();
    assert_eq!(stored.state, SendState::Failed);
    assert_eq!(
        stored
            .metadata
            .as_ref()
            .and_then(|meta| meta.get("reason"))
            .map(String::as_str),
        Some("RateLimitExceeded")
    );
}

#[tokio::test]
async fn throttle_then_success_recovers() {
    let transport = Arc::new(
        MockTransport::new()
            .with_outcome(Err(TransportError::message("rate limit exceeded")))
            .with_outcome(Ok(TransportResponse::default())),
    );
    let (ledger, record) = seeded_ledger(3).await;
    let dispatcher = dispatcher(ledger.clone(), email_registry(transport.clone()), fast_retry());
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-3@example.com", Channel::Email, "hi");
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Sent { .. }));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn transient_failures_retry_until_exhaustion() {
    let transport = Arc::new(MockTransport::new());
    for _ in 0..3 {
        transport.push_outcome(Err(TransportError::message("connection refused")));
    }
    let (ledger, record) = seeded_ledger(4).await;
    let dispatcher = dispatcher(ledger.clone(), email_registry(transport.clone()), fast_retry());
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-4@example.com", Channel::Email, "hi");
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    let AttemptOutcome::Failed { reason } = outcome else {
        panic!("expected terminal failure");
    };
    assert!(reason.contains("connection refused"));
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test]
async fn fatal_fails_immediately_without_retry() {
    let transport = Arc::new(MockTransport::new().with_outcome(Err(
        TransportError::message("550 user unknown").with_status(550),
    )));
    let (ledger, record) = seeded_ledger(5).await;
    let dispatcher = dispatcher(ledger.clone(), email_registry(transport.clone()), fast_retry());
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-5@example.com", Channel::Email, "hi");
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Failed { .. }));
    // Exactly one attempt: fatal errors are never retried.
    assert_eq!(transport.request_count(), 1);

    let events = ledger.events_for_project(7, None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventKind::Failed);
}

#[tokio::test]
async fn missing_provider_defers_and_leaves_pending() {
    let (ledger, record) = seeded_ledger(6).await;
    // Empty registry: no provider for email.
    let dispatcher = dispatcher(
        ledger.clone(),
        Arc::new(ProviderRegistry::new()),
        fast_retry(),
    );
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-6@example.com", Channel::Email, "hi");
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    assert_eq!(outcome, AttemptOutcome::Deferred);

    let stored = ledger.record(&record.key()).await.unwrap().unwrap();
    assert_eq!(stored.state, SendState::Pending);
    assert!(stored.completed_at.is_none());
}

#[tokio::test]
async fn losing_the_terminal_race_discards_silently() {
    let transport = Arc::new(MockTransport::new());
    let (ledger, record) = seeded_ledger(7).await;

    // A reconciler-derived event already marked this send failed.
    ledger
        .mark_terminal(&record.key(), SendState::Failed, Utc::now(), None)
        .await
        .unwrap();

    let dispatcher = dispatcher(ledger.clone(), email_registry(transport), fast_retry());
    let (_tx, mut rx) = broadcast::channel(1);

    let message = Message::new("user-7@example.com", Channel::Email, "hi");
    // Not an error: the later writer detects the conflict and moves on.
    let outcome = dispatcher.dispatch(&record, &message, &mut rx).await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Sent { .. }));

    // The first terminal write stands.
    let stored = ledger.record(&record.key()).await.unwrap().unwrap();
    assert_eq!(stored.state, SendState::Failed);
}

#[tokio::test]
async fn shutdown_during_backoff_leaves_record_pending() {
    let transport = Arc::new(MockTransport::new());
    for _ in 0..3 {
        transport.push_outcome(Err(TransportError::message("slow down").with_status(429)));
    }
    let (ledger, record) = seeded_ledger(8).await;
    // Long backoff so the shutdown lands inside the wait.
    let retry = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 30_000,
        max_delay_ms: 60_000,
        jitter_factor: 0.0,
    };
    let dispatcher = Arc::new(dispatcher(ledger.clone(), email_registry(transport), retry));
    let (tx, rx) = broadcast::channel(1);

    let task = {
        let dispatcher = Arc::clone(&dispatcher);
        let record = record.clone();
        let mut rx = rx;
        tokio::spawn(async move {
            let message = Message::new("user-8@example.com", Channel::Email, "hi");
            dispatcher.dispatch(&record, &message, &mut rx).await
        })
    };

    // Give the attempt time to hit the backoff sleep, then signal shutdown.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tx.send(Signal::Shutdown).unwrap();

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, AttemptOutcome::Interrupted);

    // Not forced terminal: resumable on next start.
    let stored = ledger.record(&record.key()).await.unwrap().unwrap();
    assert_eq!(stored.state, SendState::Pending);
}
