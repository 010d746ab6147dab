//! History recorder over the snapshot stream.
//!
//! Records outlive the live plane: an item that disappears before
//! completing is marked `missing` instead of being dropped, and the
//! `completed` state is permanent once reached. Deletion is an explicit
//! user action.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use peermux_core::{HistoryRecord, HistoryStatus, ItemStatus};
use peermux_events::{Event, EventBus};
use peermux_store::HistoryStore;

use crate::plane::{Snapshot, UnifiedPlane};

/// Applies snapshots to the persistent history set.
pub struct HistoryRecorder {
    store: Arc<HistoryStore>,
    events: EventBus,
}

impl HistoryRecorder {
    /// Construct a recorder over the given store.
    #[must_use]
    pub const fn new(store: Arc<HistoryStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Launch the refresh loop at the given cadence.
    pub fn spawn(self: &Arc<Self>, plane: &Arc<UnifiedPlane>, interval: Duration) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        let plane = Arc::clone(plane);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let snapshot = plane.latest();
                if let Err(err) = recorder.apply_snapshot(&snapshot) {
                    warn!(error = %err, "history refresh failed");
                }
            }
        })
    }

    /// Fold one snapshot into the history set.
    ///
    /// # Errors
    ///
    /// Returns an error when the history document cannot be persisted.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> peermux_store::StoreResult<()> {
        if snapshot.taken_at.is_none() {
            // Nothing observed yet; an empty startup snapshot must not
            // mark everything missing.
            return Ok(());
        }

        let live_hashes: HashSet<&str> = snapshot
            .items
            .iter()
            .map(|item| item.hash.as_str())
            .collect();

        let mut batch = Vec::new();
        let mut finished = Vec::new();

        for item in snapshot.items.iter() {
            let existing = self.store.get(&item.hash);
            let mut record = existing.unwrap_or_else(|| HistoryRecord {
                hash: item.hash.clone(),
                added_at: item.added_at,
                completed_at: None,
                status: HistoryStatus::Downloading,
                name: item.name.clone(),
                size: item.size,
                downloaded: 0,
                uploaded: 0,
                ratio: 0.0,
                tracker_domain: item.tracker.clone(),
                client: item.client,
                username: None,
            });

            record.name.clone_from(&item.name);
            record.size = item.size;
            record.downloaded = item.size_downloaded;
            record.uploaded = item.upload_total;
            record.ratio = ratio(item.upload_total, item.size_downloaded);
            record.tracker_domain.clone_from(&item.tracker);

            if item.progress == 100 && record.completed_at.is_none() {
                record.completed_at = Some(Utc::now());
                record.status = HistoryStatus::Completed;
                finished.push((item.hash.clone(), item.name.clone(), item.client));
            } else if record.completed_at.is_some() {
                // Completion is permanent.
                record.status = HistoryStatus::Completed;
            } else if matches!(item.status, ItemStatus::Error) {
                record.status = HistoryStatus::Error;
            } else {
                record.status = HistoryStatus::Downloading;
            }
            batch.push(record);
        }

        for mut record in self.store.list() {
            if live_hashes.contains(record.hash.as_str()) {
                continue;
            }
            if record.completed_at.is_none() && record.status != HistoryStatus::Completed {
                if record.status != HistoryStatus::Missing {
                    debug!(hash = %record.hash, "live record vanished; marking missing");
                }
                record.status = HistoryStatus::Missing;
                batch.push(record);
            }
        }

        self.store.upsert_batch(batch)?;

        for (hash, name, client) in finished {
            self.events.publish(Event::DownloadFinished {
                hash,
                name,
                client: client.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// All records.
    #[must_use]
    pub fn list(&self) -> Vec<HistoryRecord> {
        self.store.list()
    }

    /// Explicitly delete a record.
    ///
    /// # Errors
    ///
    /// Returns an error when the removal cannot be persisted.
    pub fn delete(&self, hash: &str) -> peermux_store::StoreResult<Option<HistoryRecord>> {
        self.store.remove(hash)
    }
}

fn ratio(uploaded: u64, downloaded: u64) -> f64 {
    if downloaded == 0 {
        0.0
    } else {
        to_f64(uploaded) / to_f64(downloaded)
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "u64 to f64 conversion is required for user-facing ratio reporting"
    )]
    {
        value as f64
    }
}
