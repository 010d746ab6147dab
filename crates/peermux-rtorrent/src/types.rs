//! Decoded download records and engine state normalisation.

use chrono::{DateTime, Utc};
use peermux_core::{ClientItem, ClientKind, Item, ItemStatus};
use serde_json::Value;

use crate::wire::{field_bool, field_str, field_u64};

/// One download record as the engine reports it.
#[derive(Debug, Clone)]
pub struct RtRecord {
    /// Native 40-hex info-hash.
    pub hash: String,
    /// Display name.
    pub name: String,
    /// Total payload size in bytes.
    pub size: u64,
    /// Bytes completed.
    pub completed: u64,
    /// Download rate in bytes per second.
    pub down_rate: u64,
    /// Upload rate in bytes per second.
    pub up_rate: u64,
    /// Session upload bytes.
    pub uploaded_session: u64,
    /// Lifetime upload bytes.
    pub uploaded_total: u64,
    /// Engine state word.
    pub state: String,
    /// Whether the payload is complete.
    pub complete: bool,
    /// Connected peer count.
    pub peers: u64,
    /// Attached label.
    pub label: String,
    /// First tracker URL.
    pub tracker: String,
    /// Unix timestamp of admission.
    pub added_at: u64,
    /// Engine message, when present.
    pub message: String,
}

impl RtRecord {
    /// Decode one record from the engine's JSON object form.
    #[must_use]
    pub fn from_value(object: &Value) -> Self {
        Self {
            hash: field_str(object, "hash").to_ascii_lowercase(),
            name: field_str(object, "name"),
            size: field_u64(object, "size_bytes"),
            completed: field_u64(object, "completed_bytes"),
            down_rate: field_u64(object, "down_rate"),
            up_rate: field_u64(object, "up_rate"),
            uploaded_session: field_u64(object, "uploaded_session"),
            uploaded_total: field_u64(object, "uploaded_total"),
            state: field_str(object, "state"),
            complete: field_bool(object, "complete"),
            peers: field_u64(object, "peers_connected"),
            label: field_str(object, "label"),
            tracker: field_str(object, "tracker"),
            added_at: field_u64(object, "added_at"),
            message: field_str(object, "message"),
        }
    }

    /// Project the record into the unified shape.
    #[must_use]
    pub fn into_client_item(self) -> ClientItem {
        let status = map_state(&self.state, self.complete);
        let added_at = i64::try_from(self.added_at)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        let category_token = if self.label.is_empty() {
            None
        } else {
            Some(self.label.clone())
        };
        let tracker_url = if self.tracker.is_empty() {
            None
        } else {
            Some(self.tracker.clone())
        };

        let mut item = Item {
            hash: self.hash,
            client: ClientKind::Rtorrent,
            name: self.name,
            size: self.size,
            size_downloaded: self.completed,
            progress: 0,
            download_speed: self.down_rate,
            upload_speed: self.up_rate,
            upload_session: self.uploaded_session,
            upload_total: self.uploaded_total,
            eta_seconds: None,
            status,
            message: if self.message.is_empty() {
                None
            } else {
                Some(self.message)
            },
            category: String::new(),
            tracker: String::new(),
            added_at,
            completed_at: None,
            part_status: None,
            gap_status: None,
            req_status: None,
        };
        item.normalize();
        ClientItem {
            item,
            category_token,
            tracker_url,
        }
    }
}

/// Normalise the engine's state vocabulary into the unified enum.
///
/// active + complete → seeding; active otherwise → downloading;
/// paused/stopped → paused; checking/hashing → checking; errored → error.
#[must_use]
pub fn map_state(state: &str, complete: bool) -> ItemStatus {
    match state {
        "active" if complete => ItemStatus::Seeding,
        "active" => ItemStatus::Downloading,
        "paused" | "stopped" => ItemStatus::Paused,
        "checking" | "hashing" => ItemStatus::Checking,
        "errored" | "error" => ItemStatus::Error,
        "queued" => ItemStatus::Queued,
        _ => ItemStatus::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_vocabulary_normalises() {
        assert_eq!(map_state("active", false), ItemStatus::Downloading);
        assert_eq!(map_state("active", true), ItemStatus::Seeding);
        assert_eq!(map_state("paused", false), ItemStatus::Paused);
        assert_eq!(map_state("stopped", false), ItemStatus::Paused);
        assert_eq!(map_state("checking", false), ItemStatus::Checking);
        assert_eq!(map_state("hashing", false), ItemStatus::Checking);
        assert_eq!(map_state("errored", false), ItemStatus::Error);
        assert_eq!(map_state("sleeping", false), ItemStatus::Other);
    }

    #[test]
    fn record_projection_normalises_fields() {
        let object = json!({
            "hash": "0123456789ABCDEF0123456789ABCDEF01234567",
            "name": "demo.mkv",
            "size_bytes": "2000",
            "completed_bytes": 500,
            "down_rate": "250",
            "state": "active",
            "complete": 0,
            "peers_connected": 3,
            "label": "Movies",
            "tracker": "https://tracker.example/announce",
        });
        let projected = RtRecord::from_value(&object).into_client_item();
        assert_eq!(
            projected.item.hash,
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(projected.item.progress, 25);
        assert_eq!(projected.item.eta_seconds, Some(6));
        assert_eq!(projected.category_token.as_deref(), Some("Movies"));
        assert_eq!(
            projected.tracker_url.as_deref(),
            Some("https://tracker.example/announce")
        );
    }

    #[test]
    fn empty_label_has_no_token() {
        let object = json!({"hash": "aa", "name": "x", "state": "paused"});
        let projected = RtRecord::from_value(&object).into_client_item();
        assert!(projected.category_token.is_none());
        assert!(projected.tracker_url.is_none());
        assert_eq!(projected.item.status, ItemStatus::Paused);
    }
}
