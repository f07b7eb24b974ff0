//! The cursor-batched reconciliation run.

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use herald_common::Channel;
use herald_ledger::{DeliveryEvent, LedgerStore};
use tracing::{info, warn};
use ulid::Ulid;

use crate::{
    activity::ActivityLog,
    error::ReconcileError,
    parse::derive_event,
};

/// Activity-name suffixes that mark delivery events.
const EVENT_SUFFIXES: [&str; 2] = ["_sent", "_failed"];

/// How many derived events a dry-run report carries as a sample.
const SAMPLE_LIMIT: usize = 5;

const fn default_batch() -> usize {
    1000
}

/// One reconciliation run over a project and time window.
///
/// Safe to re-run over the same or an overlapping window: inserts are
/// conflict-ignoring, the cursor is local to the run, and partial progress
/// is never rolled back. Runs over disjoint projects or windows may execute
/// concurrently; they must not share a cursor.
#[derive(Debug, Clone)]
pub struct Reconciler {
    pub project_id: u64,
    /// Inclusive window start.
    pub from: DateTime<Utc>,
    /// Inclusive window end.
    pub to: DateTime<Utc>,
    /// Rows fetched per batch.
    pub batch: usize,
    /// Report the would-be inserts without writing.
    pub dry_run: bool,
    /// Channel assumed when neither name nor payload resolves one.
    pub default_channel: Channel,
}

/// Counters and sample from a finished run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Rows fetched and examined.
    pub scanned: u64,
    /// Rows that derived a delivery event.
    pub derived: u64,
    /// Rows excluded (no campaign id, unusable name).
    pub skipped: u64,
    /// Events actually written (always 0 in dry-run mode).
    pub inserted: u64,
    /// Events that would be written; equals `inserted` in live mode.
    pub would_insert: u64,
    /// Up to [`SAMPLE_LIMIT`] derived events, populated in dry-run mode.
    pub sample: Vec<DeliveryEvent>,
    /// The final cursor position, when any row was seen.
    pub last_id: Option<u64>,
}

impl Reconciler {
    /// A live-mode run over `[from, to]` with the default batch size.
    #[must_use]
    pub fn new(project_id: u64, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            project_id,
            from,
            to,
            batch: default_batch(),
            dry_run: false,
            default_channel: Channel::Email,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub const fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    /// Toggle dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute the run.
    ///
    /// The cursor starts just below the lowest matching id in the window
    /// and advances to the maximum id seen per batch; the run terminates
    /// when a fetch returns fewer rows than the batch size.
    ///
    /// # Errors
    /// Aborts only on source or storage failure. Progress made before the
    /// failure is already committed and the run can resume from the logged
    /// cursor.
    pub async fn run(
        &self,
        log: &dyn ActivityLog,
        ledger: &dyn LedgerStore,
    ) -> Result<ReconcileReport, ReconcileError> {
        let run_id = Ulid::new();
        info!(
            %run_id,
            project_id = self.project_id,
            from = %self.from,
            to = %self.to,
            batch = self.batch,
            dry_run = self.dry_run,
            "Starting reconciliation run"
        );

        let mut report = ReconcileReport::default();

        let Some(lowest) = log
            .lowest_id(self.project_id, self.from, self.to, &EVENT_SUFFIXES)
            .await?
        else {
            info!(%run_id, "No matching activity in window");
            return Ok(report);
        };

        // The fetch predicate is strictly `id > cursor`, so the cursor seeds
        // one below the lowest matching id.
        let mut last_id = lowest.saturating_sub(1);

        // Dry-run mode must report the same count a live run would insert,
        // so it consults the existing event keys instead of writing.
        let mut existing_keys: Option<AHashSet<_>> = if self.dry_run {
            let existing = ledger.events_for_project(self.project_id, None).await?;
            Some(existing.iter().map(DeliveryEvent::key).collect())
        } else {
            None
        };

        loop {
            let rows = log
                .fetch(
                    self.project_id,
                    last_id,
                    self.from,
                    self.to,
                    &EVENT_SUFFIXES,
                    self.batch,
                )
                .await
                .inspect_err(|_| {
                    warn!(%run_id, last_id, "Aborting run, resumable from last committed id");
                })?;
            let fetched = rows.len();
            if fetched == 0 {
                break;
            }

            let mut events = Vec::new();
            for row in &rows {
                report.scanned += 1;
                last_id = last_id.max(row.id);
                match derive_event(row, self.default_channel) {
                    Some(event) => events.push(event),
                    None => report.skipped += 1,
                }
            }
            report.derived += events.len() as u64;
            report.last_id = Some(last_id);

            if let Some(existing) = &mut existing_keys {
                // Dry run: count and sample, never write.
                for event in events {
                    if existing.insert(event.key()) {
                        report.would_insert += 1;
                        if report.sample.len() < SAMPLE_LIMIT {
                            report.sample.push(event);
                        }
                    }
                }
            } else {
                let inserted = ledger.insert_events_ignore(events).await.inspect_err(|_| {
                    warn!(%run_id, last_id, "Aborting run, resumable from last committed id");
                })?;
                report.inserted += inserted as u64;
                report.would_insert += inserted as u64;
            }

            if fetched < self.batch {
                break;
            }
        }

        info!(
            %run_id,
            scanned = report.scanned,
            derived = report.derived,
            skipped = report.skipped,
            inserted = report.inserted,
            would_insert = report.would_insert,
            "Reconciliation run finished"
        );

        Ok(report)
    }
}
