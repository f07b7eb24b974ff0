//! Storage abstraction for the send ledger.

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::Channel;

use crate::{DeliveryEvent, EventKey, Result, SendRecord, SendState};

/// Counts of rows held by a ledger store, for operational dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
    pub events: usize,
}

impl LedgerStats {
    /// Total number of send records.
    #[must_use]
    pub const fn total_records(&self) -> usize {
        self.pending + self.sent + self.failed
    }
}

/// Pure storage contract for send records and delivery events.
///
/// No business logic lives here; the dispatcher and the reconciler decide
/// when to write. Implementations must back `upsert_ignore` and
/// `insert_events_ignore` with a real uniqueness guarantee on [`EventKey`]
/// rather than emulating it with read-then-write.
#[async_trait]
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    /// Insert a send record unless one already exists for its conflict key.
    ///
    /// Returns `true` if the record was inserted, `false` if a row for the
    /// key was already present (a no-op, not an error).
    ///
    /// # Errors
    /// Returns an error only on storage failure.
    async fn upsert_ignore(&self, record: SendRecord) -> Result<bool>;

    /// Insert a batch of delivery events, ignoring conflicts.
    ///
    /// Events whose conflict key is already present are skipped. Returns the
    /// number of events actually inserted, so that re-running a
    /// reconciliation over an overlapping window reports zero new rows.
    ///
    /// # Errors
    /// Returns an error only on storage failure; duplicates never fail.
    async fn insert_events_ignore(&self, events: Vec<DeliveryEvent>) -> Result<usize>;

    /// All pending records scheduled at or before `older_than`, ordered by
    /// schedule time ascending.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    async fn find_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<SendRecord>>;

    /// Transition the record for `key` to a terminal state.
    ///
    /// Exactly one terminal write wins per key: if the record is already
    /// terminal this is a silent no-op returning `false`. Metadata, when
    /// given, replaces the record's metadata (used to persist provider
    /// result codes and failure reasons).
    ///
    /// # Errors
    /// Returns [`crate::LedgerError::NotFound`] if no record exists for the key.
    async fn mark_terminal(
        &self,
        key: &EventKey,
        state: SendState,
        completed_at: DateTime<Utc>,
        metadata: Option<AHashMap<String, String>>,
    ) -> Result<bool>;

    /// Fetch a single record by conflict key.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    async fn record(&self, key: &EventKey) -> Result<Option<SendRecord>>;

    /// Range scan over records by schedule time, optionally filtered by
    /// state, ordered by schedule time ascending.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    async fn records_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        state: Option<SendState>,
    ) -> Result<Vec<SendRecord>>;

    /// All delivery events for a project, optionally filtered by channel.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    async fn events_for_project(
        &self,
        project_id: u64,
        channel: Option<Channel>,
    ) -> Result<Vec<DeliveryEvent>>;

    /// Row counts for dashboards and the control CLI.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    async fn stats(&self) -> Result<LedgerStats>;
}
