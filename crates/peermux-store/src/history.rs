//! Persistence for the append-only history record set.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use peermux_core::HistoryRecord;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::atomic;
use crate::error::StoreResult;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDoc {
    #[serde(default)]
    records: HashMap<String, HistoryRecord>,
}

/// File-backed history records keyed by hash.
///
/// The recorder upserts the full in-memory map once per snapshot tick, so
/// the store keeps it resident and persists the whole document per flush.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    records: Mutex<HashMap<String, HistoryRecord>>,
}

impl HistoryStore {
    /// Open the store, creating a fresh one when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing document cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let doc: HistoryDoc = atomic::read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            records: Mutex::new(doc.records),
        })
    }

    /// Fetch a record by hash.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<HistoryRecord> {
        self.lock_records().get(hash).cloned()
    }

    /// All records, in unspecified order.
    #[must_use]
    pub fn list(&self) -> Vec<HistoryRecord> {
        self.lock_records().values().cloned().collect()
    }

    /// Replace or insert a batch of records and flush to disk once.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    pub fn upsert_batch(&self, batch: Vec<HistoryRecord>) -> StoreResult<()> {
        let snapshot = {
            let mut records = self.lock_records();
            for record in batch {
                records.insert(record.hash.clone(), record);
            }
            records.clone()
        };
        self.flush(snapshot)
    }

    /// Remove a record; explicit user action only.
    ///
    /// # Errors
    ///
    /// Returns an error when the document cannot be written.
    pub fn remove(&self, hash: &str) -> StoreResult<Option<HistoryRecord>> {
        let (removed, snapshot) = {
            let mut records = self.lock_records();
            let removed = records.remove(hash);
            (removed, records.clone())
        };
        if removed.is_some() {
            self.flush(snapshot)?;
        }
        Ok(removed)
    }

    fn flush(&self, records: HashMap<String, HistoryRecord>) -> StoreResult<()> {
        atomic::write_json(&self.path, &HistoryDoc { records })
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, HistoryRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("history store lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Utc;
    use peermux_core::{ClientKind, HistoryStatus};
    use tempfile::TempDir;

    fn record(hash: &str) -> HistoryRecord {
        HistoryRecord {
            hash: hash.to_string(),
            added_at: Utc::now(),
            completed_at: None,
            status: HistoryStatus::Downloading,
            name: "demo.iso".into(),
            size: 1_000,
            downloaded: 100,
            uploaded: 10,
            ratio: 0.1,
            tracker_domain: "tracker.example".into(),
            client: ClientKind::Rtorrent,
            username: None,
        }
    }

    #[test]
    fn upsert_and_reopen_round_trip() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("history.json");
        let hash = "a".repeat(40);

        let store = HistoryStore::open(&path)?;
        store.upsert_batch(vec![record(&hash)])?;
        drop(store);

        let reopened = HistoryStore::open(&path)?;
        let loaded = reopened.get(&hash).expect("record missing");
        assert_eq!(loaded.name, "demo.iso");
        assert_eq!(loaded.status, HistoryStatus::Downloading);
        Ok(())
    }

    #[test]
    fn remove_is_explicit_and_persisted() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("history.json");
        let hash = "b".repeat(40);

        let store = HistoryStore::open(&path)?;
        store.upsert_batch(vec![record(&hash)])?;
        assert!(store.remove(&hash)?.is_some());
        assert!(store.remove(&hash)?.is_none());
        drop(store);

        let reopened = HistoryStore::open(&path)?;
        assert!(reopened.get(&hash).is_none());
        Ok(())
    }
}
