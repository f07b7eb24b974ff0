//! File-backed ledger store.
//!
//! Rows are stored one bincode file per conflict key:
//! - `records/{key}.bin` - send records
//! - `events/{key}.bin` - delivery events
//!
//! The filename is derived from the sanitized conflict key, so
//! insert-or-ignore is backed by the key index loaded at startup plus the
//! existence of the file itself. All writes go through the
//! write-to-temp-then-rename pattern so a crash never leaves a partial row
//! behind.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use herald_common::Channel;
use serde::{Serialize, de::DeserializeOwned};
use tokio::fs;
use tracing::warn;

use crate::{
    DeliveryEvent, EventKey, LedgerError, LedgerStats, LedgerStore, Result, SendRecord, SendState,
    error::SerializationError,
};

const RECORDS_DIR: &str = "records";
const EVENTS_DIR: &str = "events";

/// File-backed ledger store.
#[derive(Debug)]
pub struct FileLedger {
    records_dir: PathBuf,
    events_dir: PathBuf,
    /// Conflict keys of persisted send records.
    record_index: DashMap<EventKey, ()>,
    /// Conflict keys of persisted delivery events.
    event_index: DashMap<EventKey, ()>,
    /// Serializes read-modify-write transitions on record files.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileLedger {
    /// Open (or create) a ledger rooted at `path` and load the key indexes
    /// from disk.
    ///
    /// Files that fail to decode are skipped with a warning rather than
    /// aborting startup; a corrupt row must not take the pipeline down.
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created or scanned.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref();
        let records_dir = root.join(RECORDS_DIR);
        let events_dir = root.join(EVENTS_DIR);
        fs::create_dir_all(&records_dir).await?;
        fs::create_dir_all(&events_dir).await?;

        let ledger = Self {
            records_dir,
            events_dir,
            record_index: DashMap::new(),
            event_index: DashMap::new(),
            write_lock: tokio::sync::Mutex::new(()),
        };

        Self::sweep_temp_files(&ledger.records_dir).await?;
        Self::sweep_temp_files(&ledger.events_dir).await?;

        for record in Self::load_all::<SendRecord>(&ledger.records_dir).await? {
            ledger.record_index.insert(record.key(), ());
        }
        for event in Self::load_all::<DeliveryEvent>(&ledger.events_dir).await? {
            ledger.event_index.insert(event.key(), ());
        }

        Ok(ledger)
    }

    /// Filesystem-safe filename for a conflict key.
    ///
    /// The reference id is percent-encoded down to `[A-Za-z0-9-]` so that a
    /// hostile reference id can never escape the ledger directory. The name
    /// is never parsed back; indexes are rebuilt from file contents.
    fn filename(key: &EventKey) -> String {
        let mut encoded = String::with_capacity(key.reference_id.len());
        for byte in key.reference_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                encoded.push(char::from(byte));
            } else {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
        format!(
            "{}_{}_{}_{}.bin",
            key.campaign_id, key.user_id, key.channel, encoded
        )
    }

    fn record_path(&self, key: &EventKey) -> PathBuf {
        self.records_dir.join(Self::filename(key))
    }

    fn event_path(&self, key: &EventKey) -> PathBuf {
        self.events_dir.join(Self::filename(key))
    }

    /// Remove orphaned temp files left behind by a crash mid-write.
    async fn sweep_temp_files(dir: &Path) -> Result<()> {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                warn!(path = %path.display(), "Removing orphaned temp file");
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically: write a temp file, then rename into place.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn write_row<T: Serialize>(path: &Path, row: &T) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(row, bincode::config::standard())
            .map_err(SerializationError::from)?;
        Self::write_atomic(path, &bytes).await
    }

    async fn read_row<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let bytes = fs::read(path).await?;
        let (row, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(SerializationError::from)?;
        Ok(row)
    }

    /// Scan a directory and decode every `.bin` row, skipping corrupt files.
    async fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "bin") {
                continue;
            }
            match Self::read_row::<T>(&path).await {
                Ok(row) => rows.push(row),
                Err(error) => {
                    warn!(path = %path.display(), %error, "Skipping unreadable ledger row");
                }
            }
        }

        Ok(rows)
    }

    async fn load_records(&self) -> Result<Vec<SendRecord>> {
        let mut records = Self::load_all::<SendRecord>(&self.records_dir).await?;
        records.sort_by(|a, b| a.send_at.cmp(&b.send_at).then_with(|| a.key().cmp(&b.key())));
        Ok(records)
    }
}

#[async_trait]
impl LedgerStore for FileLedger {
    async fn upsert_ignore(&self, record: SendRecord) -> Result<bool> {
        let key = record.key();
        // Reserve the key before touching the filesystem so a concurrent
        // writer for the same key backs off immediately.
        match self.record_index.entry(key.clone()) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(());
            }
        }

        let path = self.record_path(&key);
        if let Err(error) = Self::write_row(&path, &record).await {
            self.record_index.remove(&key);
            return Err(error);
        }
        Ok(true)
    }

    async fn insert_events_ignore(&self, events: Vec<DeliveryEvent>) -> Result<usize> {
        let mut inserted = 0;
        for event in events {
            let key = event.key();
            match self.event_index.entry(key.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    entry.insert(());
                }
            }

            let path = self.event_path(&key);
            if let Err(error) = Self::write_row(&path, &event).await {
                self.event_index.remove(&key);
                return Err(error);
            }
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn find_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<SendRecord>> {
        Ok(self
            .load_records()
            .await?
            .into_iter()
            .filter(|record| record.state == SendState::Pending && record.send_at <= older_than)
            .collect())
    }

    async fn mark_terminal(
        &self,
        key: &EventKey,
        state: SendState,
        completed_at: DateTime<Utc>,
        metadata: Option<AHashMap<String, String>>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if !self.record_index.contains_key(key) {
            return Err(LedgerError::NotFound(key.clone()));
        }

        let path = self.record_path(key);
        let mut record = Self::read_row::<SendRecord>(&path).await?;
        if record.state.is_terminal() {
            return Ok(false);
        }

        record.state = state;
        record.completed_at = Some(completed_at);
        if metadata.is_some() {
            record.metadata = metadata;
        }

        Self::write_row(&path, &record).await?;
        Ok(true)
    }

    async fn record(&self, key: &EventKey) -> Result<Option<SendRecord>> {
        if !self.record_index.contains_key(key) {
            return Ok(None);
        }
        Ok(Some(Self::read_row(&self.record_path(key)).await?))
    }

    async fn records_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        state: Option<SendState>,
    ) -> Result<Vec<SendRecord>> {
        Ok(self
            .load_records()
            .await?
            .into_iter()
            .filter(|record| record.send_at >= from && record.send_at <= to)
            .filter(|record| state.is_none_or(|wanted| record.state == wanted))
            .collect())
    }

    async fn events_for_project(
        &self,
        project_id: u64,
        channel: Option<Channel>,
    ) -> Result<Vec<DeliveryEvent>> {
        let mut events: Vec<DeliveryEvent> = Self::load_all::<DeliveryEvent>(&self.events_dir)
            .await?
            .into_iter()
            .filter(|event| event.project_id == project_id)
            .filter(|event| channel.is_none_or(|wanted| event.channel == wanted))
            .collect();

        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key().cmp(&b.key())));
        Ok(events)
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats {
            events: self.event_index.len(),
            ..LedgerStats::default()
        };

        for record in self.load_records().await? {
            match record.state {
                SendState::Pending => stats.pending += 1,
                SendState::Sent => stats.sent += 1,
                SendState::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_sanitized() {
        let key = EventKey::new(9, 3, Channel::Email, "../../etc/passwd");
        let name = FileLedger::filename(&key);
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert_eq!(name, "9_3_email_%2E%2E%2F%2E%2E%2Fetc%2Fpasswd.bin");
    }

    #[test]
    fn filenames_are_distinct_per_reference() {
        let a = FileLedger::filename(&EventKey::new(1, 2, Channel::Push, "a_b"));
        let b = FileLedger::filename(&EventKey::new(1, 2, Channel::Push, "a%5Fb"));
        assert_ne!(a, b);
    }
}
