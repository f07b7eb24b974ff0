//! Raw activity log input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ActivityError;

/// One entry of the upstream activity log.
///
/// Produced continuously by upstream systems and never mutated. The name
/// encodes `{channel}_{outcome}` (e.g. `email_sent`); the payload is
/// free-form JSON, sometimes double-encoded as a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawActivityRecord {
    /// Monotonic identifier, the reconciliation cursor's unit.
    pub id: u64,
    pub project_id: u64,
    pub user_id: u64,
    /// Activity name, e.g. `email_sent` or `push_failed`.
    pub name: String,
    /// Free-form payload: a JSON object, or a JSON string containing one.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RawActivityRecord {
    /// Convenience constructor for embedding and tests.
    #[must_use]
    pub fn new(
        id: u64,
        project_id: u64,
        user_id: u64,
        name: impl Into<String>,
        data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            user_id,
            name: name.into(),
            data,
            created_at,
        }
    }
}

/// Read-only source of raw activity records.
///
/// Implementations back onto whatever store the upstream event-capture
/// system writes to; the contract only requires cursor-friendly ordered
/// reads.
#[async_trait]
pub trait ActivityLog: Send + Sync + std::fmt::Debug {
    /// Up to `limit` records for the project with `id > after_id` and
    /// `created_at` within `[from, to]`, whose name ends with one of
    /// `suffixes`, ordered by id ascending.
    ///
    /// # Errors
    /// Returns an error on source failure.
    async fn fetch(
        &self,
        project_id: u64,
        after_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        suffixes: &[&str],
        limit: usize,
    ) -> Result<Vec<RawActivityRecord>, ActivityError>;

    /// Lowest matching id in the window, used to seed the cursor.
    ///
    /// # Errors
    /// Returns an error on source failure.
    async fn lowest_id(
        &self,
        project_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        suffixes: &[&str],
    ) -> Result<Option<u64>, ActivityError>;
}

/// In-memory activity log for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    records: RwLock<Vec<RawActivityRecord>>,
}

impl MemoryActivityLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&self, record: RawActivityRecord) {
        self.records.write().push(record);
    }

    fn matching(
        &self,
        project_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        suffixes: &[&str],
    ) -> Vec<RawActivityRecord> {
        let mut rows: Vec<RawActivityRecord> = self
            .records
            .read()
            .iter()
            .filter(|row| row.project_id == project_id)
            .filter(|row| row.created_at >= from && row.created_at <= to)
            .filter(|row| suffixes.iter().any(|suffix| row.name.ends_with(suffix)))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn fetch(
        &self,
        project_id: u64,
        after_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        suffixes: &[&str],
        limit: usize,
    ) -> Result<Vec<RawActivityRecord>, ActivityError> {
        let mut rows = self.matching(project_id, from, to, suffixes);
        rows.retain(|row| row.id > after_id);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn lowest_id(
        &self,
        project_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        suffixes: &[&str],
    ) -> Result<Option<u64>, ActivityError> {
        Ok(self
            .matching(project_id, from, to, suffixes)
            .first()
            .map(|row| row.id))
    }
}
