//! Worker-pool processor that drains the send ledger.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use herald_common::{Signal, internal};
use herald_ledger::LedgerStore;
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    dispatcher::{Dispatcher, MessageSource},
    error::DispatchError,
    rate_limiter::{RateLimitConfig, RateLimiter},
    registry::ProviderRegistry,
    retry::RetryPolicy,
};

const fn default_process_interval() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

/// Processor for dispatching pending sends from the ledger.
///
/// Runs continuously, draining due records at a configurable interval with
/// a bounded pool of concurrent send tasks. Each task operates on a disjoint
/// record; the only shared state is the ledger, whose conflict-ignoring
/// upserts make concurrent terminal writes safe without locks.
#[derive(Debug, Deserialize)]
pub struct DispatchProcessor {
    /// How often to poll the ledger for due records (in seconds).
    #[serde(default = "default_process_interval")]
    pub process_interval_secs: u64,

    /// Maximum number of concurrent send tasks.
    ///
    /// Default: the number of CPUs.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_sends: usize,

    /// Retry policy applied to every attempt sequence.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-channel outbound rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// The send ledger (initialized in `init()`).
    #[serde(skip)]
    ledger: Option<Arc<dyn LedgerStore>>,

    /// Renders messages for pending records (initialized in `init()`).
    #[serde(skip)]
    source: Option<Arc<dyn MessageSource>>,

    /// The per-record state machine (initialized in `init()`).
    #[serde(skip)]
    dispatcher: Option<Arc<Dispatcher>>,
}

impl Default for DispatchProcessor {
    fn default() -> Self {
        Self {
            process_interval_secs: default_process_interval(),
            max_concurrent_sends: default_max_concurrent(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            ledger: None,
            source: None,
            dispatcher: None,
        }
    }
}

impl DispatchProcessor {
    /// Wire the processor to its collaborators.
    ///
    /// Verifies every registered provider once at boot; failed checks mark
    /// the provider unavailable without aborting startup.
    pub async fn init(
        &mut self,
        ledger: Arc<dyn LedgerStore>,
        providers: Arc<ProviderRegistry>,
        source: Arc<dyn MessageSource>,
    ) {
        internal!("Initialising Dispatch Processor ...");

        let healthy = providers.verify_all().await;
        internal!(
            "Verified providers: {healthy}/{} available",
            providers.len()
        );

        self.dispatcher = Some(Arc::new(Dispatcher::new(
            Arc::clone(&ledger),
            providers,
            self.retry.clone(),
            Arc::new(RateLimiter::new(self.rate_limit.clone())),
        )));
        self.ledger = Some(ledger);
        self.source = Some(source);
    }

    /// Run the processor until a shutdown signal is received.
    ///
    /// In-flight attempts observe the same signal and abort at their next
    /// suspension point, leaving their records pending for the next start.
    ///
    /// # Errors
    /// Returns an error if the processor was not initialized.
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DispatchError> {
        internal!("Dispatch processor starting");

        let (Some(ledger), Some(source), Some(dispatcher)) =
            (&self.ledger, &self.source, &self.dispatcher)
        else {
            return Err(DispatchError::NotInitialized(
                "Dispatch processor not initialized. Call init() first.".to_string(),
            ));
        };

        let mut process_timer =
            tokio::time::interval(Duration::from_secs(self.process_interval_secs));

        // Independent handle for spawned workers, so each send task gets its
        // own receiver without touching the serve loop's.
        let worker_shutdown = shutdown.resubscribe();

        // Skip the first tick to avoid immediate execution
        process_timer.tick().await;

        loop {
            tokio::select! {
                _ = process_timer.tick() => {
                    match self
                        .process_due(dispatcher, ledger, source, &worker_shutdown)
                        .await
                    {
                        Ok(count) if count > 0 => {
                            info!("Processed {count} due sends");
                        }
                        Ok(_) => {
                            debug!("No due sends");
                        }
                        Err(e) => {
                            error!("Error processing due sends: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Dispatch processor received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            error!("Dispatch processor shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        internal!("Dispatch processor shutdown complete");
        Ok(())
    }

    /// Dispatch every due record with a bounded pool of parallel workers.
    async fn process_due(
        &self,
        dispatcher: &Arc<Dispatcher>,
        ledger: &Arc<dyn LedgerStore>,
        source: &Arc<dyn MessageSource>,
        shutdown: &broadcast::Receiver<Signal>,
    ) -> Result<usize, DispatchError> {
        let due = ledger.find_pending(Utc::now()).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let total = due.len();
        debug!(
            due = total,
            max_concurrent = self.max_concurrent_sends,
            "Dispatching due sends with parallel workers"
        );

        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut due_iter = due.into_iter();

        // Spawn the initial batch, then replenish as tasks complete.
        for _ in 0..self.max_concurrent_sends.min(total) {
            if let Some(record) = due_iter.next() {
                join_set.spawn(dispatch_task(
                    Arc::clone(dispatcher),
                    Arc::clone(source),
                    record,
                    shutdown.resubscribe(),
                ));
            }
        }

        while join_set.join_next().await.is_some() {
            if let Some(record) = due_iter.next() {
                join_set.spawn(dispatch_task(
                    Arc::clone(dispatcher),
                    Arc::clone(source),
                    record,
                    shutdown.resubscribe(),
                ));
            }
        }

        Ok(total)
    }
}

/// One worker: render the message and run the attempt state machine.
async fn dispatch_task(
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn MessageSource>,
    record: herald_ledger::SendRecord,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let Some(message) = source.render(&record).await else {
        warn!(key = %record.key(), "Message source produced nothing, leaving record pending");
        return;
    };

    match dispatcher.dispatch(&record, &message, &mut shutdown).await {
        Ok(outcome) => {
            debug!(key = %record.key(), ?outcome, "Dispatch finished");
        }
        Err(e) => {
            error!(key = %record.key(), error = %e, "Dispatch failed with storage error");
        }
    }
}
