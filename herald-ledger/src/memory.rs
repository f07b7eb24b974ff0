//! In-memory ledger store.

use std::{collections::BTreeMap, sync::Arc};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use herald_common::Channel;
use parking_lot::RwLock;

use crate::{
    DeliveryEvent, EventKey, LedgerError, LedgerStats, LedgerStore, Result, SendRecord, SendState,
};

/// Memory-backed ledger store.
///
/// Records and events live in lock-free maps keyed by [`EventKey`]; the
/// uniqueness guarantee is the map itself, with insert-or-ignore going
/// through the vacant-entry API. A composite `(send_at, key)` index supports
/// schedule-window scans without walking the full record set.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<DashMap<EventKey, SendRecord>>,
    events: Arc<DashMap<EventKey, DeliveryEvent>>,
    /// Schedule-ordered composite index: `(send_at, key) -> state`.
    schedule: Arc<RwLock<BTreeMap<(DateTime<Utc>, EventKey), SendState>>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of send records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger holds no send records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn upsert_ignore(&self, record: SendRecord) -> Result<bool> {
        let key = record.key();
        match self.records.entry(key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                self.schedule
                    .write()
                    .insert((record.send_at, key), record.state);
                entry.insert(record);
                Ok(true)
            }
        }
    }

    async fn insert_events_ignore(&self, events: Vec<DeliveryEvent>) -> Result<usize> {
        let mut inserted = 0;
        for event in events {
            if let Entry::Vacant(entry) = self.events.entry(event.key()) {
                entry.insert(event);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<SendRecord>> {
        let keys: Vec<EventKey> = self
            .schedule
            .read()
            .iter()
            .take_while(|((send_at, _), _)| *send_at <= older_than)
            .filter(|(_, state)| **state == SendState::Pending)
            .map(|((_, key), _)| key.clone())
            .collect();

        Ok(keys
            .iter()
            .filter_map(|key| self.records.get(key).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn mark_terminal(
        &self,
        key: &EventKey,
        state: SendState,
        completed_at: DateTime<Utc>,
        metadata: Option<AHashMap<String, String>>,
    ) -> Result<bool> {
        let Some(mut entry) = self.records.get_mut(key) else {
            return Err(LedgerError::NotFound(key.clone()));
        };

        let record = entry.value_mut();
        if record.state.is_terminal() {
            // First terminal write wins; later writers discard silently.
            return Ok(false);
        }

        record.state = state;
        record.completed_at = Some(completed_at);
        if metadata.is_some() {
            record.metadata = metadata;
        }

        self.schedule
            .write()
            .insert((record.send_at, key.clone()), state);

        Ok(true)
    }

    async fn record(&self, key: &EventKey) -> Result<Option<SendRecord>> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn records_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        state: Option<SendState>,
    ) -> Result<Vec<SendRecord>> {
        let keys: Vec<EventKey> = self
            .schedule
            .read()
            .iter()
            .skip_while(|((send_at, _), _)| *send_at < from)
            .take_while(|((send_at, _), _)| *send_at <= to)
            .filter(|(_, row_state)| state.is_none_or(|wanted| **row_state == wanted))
            .map(|((_, key), _)| key.clone())
            .collect();

        Ok(keys
            .iter()
            .filter_map(|key| self.records.get(key).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn events_for_project(
        &self,
        project_id: u64,
        channel: Option<Channel>,
    ) -> Result<Vec<DeliveryEvent>> {
        let mut events: Vec<DeliveryEvent> = self
            .events
            .iter()
            .filter(|entry| entry.value().project_id == project_id)
            .filter(|entry| channel.is_none_or(|wanted| entry.value().channel == wanted))
            .map(|entry| entry.value().clone())
            .collect();

        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key().cmp(&b.key())));
        Ok(events)
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats {
            events: self.events.len(),
            ..LedgerStats::default()
        };

        for entry in self.records.iter() {
            match entry.value().state {
                SendState::Pending => stats.pending += 1,
                SendState::Sent => stats.sent += 1,
                SendState::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}
