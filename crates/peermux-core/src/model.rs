//! Unified data model shared across the bridge.
//!
//! # Design
//! - `Item` is the merged download/share record keyed by a 40-hex hash.
//! - Categories are name-keyed on the bridge side; per-client mirrors carry
//!   the numeric id (ED2K) or bare label (BitTorrent) back to each engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the category that always exists and cannot be mutated.
pub const DEFAULT_CATEGORY: &str = "Default";

/// Back-end client that owns a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// ED2K/Kademlia engine driven over the binary EC protocol.
    Amule,
    /// BitTorrent engine driven over the line-oriented RPC.
    Rtorrent,
}

impl ClientKind {
    /// Stable lowercase identifier used in wire payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amule => "amule",
            Self::Rtorrent => "rtorrent",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised lifecycle state of a unified item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Actively fetching payload data.
    Downloading,
    /// Paused or stopped by the user.
    Paused,
    /// Complete and uploading to peers.
    Seeding,
    /// The engine reported an error condition.
    Error,
    /// Download finished; not necessarily seeding.
    Completed,
    /// Waiting for a transfer slot.
    Queued,
    /// Hashing or verifying on-disk data.
    Checking,
    /// Any state the vocabulary mapping does not recognise.
    Other,
}

/// Merged item produced by the unified data plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Primary key: 40-hex info-hash (native for BT, synthesised for ED2K).
    pub hash: String,
    /// Back-end that owns this record.
    pub client: ClientKind,
    /// Display name.
    pub name: String,
    /// Total payload size in bytes.
    pub size: u64,
    /// Bytes downloaded so far; never exceeds `size`.
    pub size_downloaded: u64,
    /// Completion percentage, floored to an integer in `0..=100`.
    pub progress: u8,
    /// Current download rate in bytes per second.
    pub download_speed: u64,
    /// Current upload rate in bytes per second.
    pub upload_speed: u64,
    /// Bytes uploaded during the current session.
    pub upload_session: u64,
    /// Bytes uploaded over the record's lifetime.
    pub upload_total: u64,
    /// Estimated seconds to completion; `None` when stalled.
    pub eta_seconds: Option<u64>,
    /// Normalised lifecycle state.
    pub status: ItemStatus,
    /// Optional engine-supplied status message.
    pub message: Option<String>,
    /// Unified category name; `Default` when unresolved.
    pub category: String,
    /// Tracker domain (eTLD+1) or empty when unknown.
    pub tracker: String,
    /// Timestamp when the record was admitted.
    pub added_at: DateTime<Utc>,
    /// Timestamp of completion, if reached.
    pub completed_at: Option<DateTime<Utc>>,
    /// ED2K-only per-part source counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_status: Option<Vec<u8>>,
    /// ED2K-only `[start, end)` gap ranges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_status: Option<Vec<(u64, u64)>>,
    /// ED2K-only pending request ranges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_status: Option<Vec<(u64, u64)>>,
}

impl Item {
    /// Enforce the cross-field invariants every snapshot must satisfy.
    ///
    /// `size_downloaded` is clamped to `size`, `progress` is recomputed as
    /// `floor(100 * downloaded / size)`, a seeding item is forced to 100 %,
    /// and the eta is derived from speed and remaining bytes when absent.
    pub fn normalize(&mut self) {
        if self.size_downloaded > self.size {
            self.size_downloaded = self.size;
        }
        if matches!(self.status, ItemStatus::Seeding) {
            self.size_downloaded = self.size;
        }
        self.progress = if self.size == 0 {
            0
        } else {
            u8::try_from(self.size_downloaded.saturating_mul(100) / self.size).unwrap_or(100)
        };
        if self.eta_seconds.is_none() && self.progress < 100 {
            let remaining = self.size - self.size_downloaded;
            self.eta_seconds = if self.download_speed == 0 {
                None
            } else {
                Some(remaining / self.download_speed)
            };
        }
        if self.progress == 100 && self.eta_seconds.is_some() {
            self.eta_seconds = None;
        }
    }
}

/// Item as produced by a client adapter, before category resolution.
#[derive(Debug, Clone)]
pub struct ClientItem {
    /// Projected record; `category` is still unresolved.
    pub item: Item,
    /// Raw category token (numeric id rendered as string for ED2K,
    /// bare label for BitTorrent).
    pub category_token: Option<String>,
    /// First tracker URL reported by the engine, if any.
    pub tracker_url: Option<String>,
}

/// Transfer priority attached to a category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CategoryPriority {
    /// Default engine priority.
    #[default]
    Normal,
    /// Elevated priority.
    High,
    /// Throttled priority.
    Low,
    /// Let the engine decide.
    Auto,
}

/// Per-client translations of a category path.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PathMappings {
    /// Path as seen by the ED2K engine's container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amule: Option<String>,
    /// Path as seen by the BitTorrent engine's container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtorrent: Option<String>,
    /// Path advertised through the qBittorrent facade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qbittorrent: Option<String>,
}

impl PathMappings {
    /// Resolve the mapping for a client, if one is configured.
    #[must_use]
    pub fn for_client(&self, client: ClientKind) -> Option<&str> {
        match client {
            ClientKind::Amule => self.amule.as_deref(),
            ClientKind::Rtorrent => self.rtorrent.as_deref(),
        }
    }
}

/// Unified category definition, keyed by case-sensitive name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    /// Case-sensitive primary key.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Canonical download path.
    pub path: String,
    /// Per-client path translations.
    #[serde(default)]
    pub path_mappings: PathMappings,
    /// 24-bit RGB colour.
    pub color: u32,
    /// Transfer priority.
    #[serde(default)]
    pub priority: CategoryPriority,
    /// Free-form comment.
    #[serde(default)]
    pub comment: String,
}

impl Category {
    /// Construct the immutable `Default` category.
    #[must_use]
    pub fn default_category() -> Self {
        Self {
            name: DEFAULT_CATEGORY.to_string(),
            title: DEFAULT_CATEGORY.to_string(),
            path: String::new(),
            path_mappings: PathMappings::default(),
            color: 0,
            priority: CategoryPriority::Normal,
            comment: String::new(),
        }
    }

    /// Whether this is the protected `Default` category.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CATEGORY
    }

    /// Effective path for a client: the mapping override, else the
    /// canonical path.
    #[must_use]
    pub fn effective_path(&self, client: ClientKind) -> &str {
        self.path_mappings
            .for_client(client)
            .unwrap_or(self.path.as_str())
    }
}

/// Category entry mirrored inside a back-end client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorCategory {
    /// Numeric id inside the ED2K engine; `None` for label-keyed engines.
    pub id: Option<u32>,
    /// Name or label as stored by the engine.
    pub name: String,
    /// Download path as stored by the engine.
    pub path: String,
}

/// Request for admitting a record through a back-end client.
#[derive(Debug, Clone)]
pub enum AddRequest {
    /// ED2K link plus the target category's numeric id.
    Ed2kLink {
        /// `ed2k://|file|…|/` link to admit.
        link: String,
        /// Mirror category id inside the ED2K engine.
        category_id: u32,
    },
    /// Magnet URI plus the target label.
    Magnet {
        /// Magnet URI to admit.
        uri: String,
        /// Label to attach inside the BitTorrent engine.
        label: String,
    },
    /// Raw `.torrent` metainfo bytes plus the target label.
    TorrentFile {
        /// Bencoded metainfo payload.
        bytes: Vec<u8>,
        /// Label to attach inside the BitTorrent engine.
        label: String,
    },
}

/// Search hit surfaced through the Torznab adapter and the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 40-hex hash addressable through the qBittorrent facade.
    pub hash: String,
    /// File name.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Sources currently offering the file.
    pub sources: u32,
    /// Sources holding the complete file.
    pub complete_sources: u32,
    /// Download link (magnet or ed2k).
    pub link: String,
    /// Back-end that produced the hit.
    pub client: ClientKind,
}

/// Aggregate transfer statistics for one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Sum of item download rates in bytes per second.
    pub download_speed: u64,
    /// Sum of item upload rates in bytes per second.
    pub upload_speed: u64,
    /// Bytes downloaded across the session.
    pub session_downloaded: u64,
    /// Bytes uploaded across the session.
    pub session_uploaded: u64,
    /// Number of live items.
    pub item_count: usize,
}

/// One ED2K server entry surfaced through the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerInfo {
    /// Display name.
    pub name: String,
    /// `host:port` of the server.
    pub addr: String,
    /// Users currently on the server.
    pub users: u64,
    /// Files indexed by the server.
    pub files: u64,
    /// Whether the engine is connected to this server.
    pub connected: bool,
}

/// Peer record enriched by the hostname resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Remote IP in string form.
    pub ip: String,
    /// Reverse-resolved hostname when cached.
    pub hostname: Option<String>,
    /// Peer client banner.
    pub client_name: String,
    /// Download rate from this peer in bytes per second.
    pub download_speed: u64,
    /// Upload rate to this peer in bytes per second.
    pub upload_speed: u64,
}

/// Terminality-aware history state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    /// Record observed live and incomplete.
    Downloading,
    /// Record reached 100 % at least once; permanent.
    Completed,
    /// Record vanished from the live plane before completing.
    Missing,
    /// Record last observed in an error state.
    Error,
}

/// Append-only record of an observed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Item hash.
    pub hash: String,
    /// First observation time.
    pub added_at: DateTime<Utc>,
    /// Completion time, set once.
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub status: HistoryStatus,
    /// Display name at last observation.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Bytes downloaded at last observation.
    pub downloaded: u64,
    /// Bytes uploaded at last observation.
    pub uploaded: u64,
    /// Upload/download ratio at last observation.
    pub ratio: f64,
    /// Tracker domain at last observation.
    pub tracker_domain: String,
    /// Owning back-end.
    pub client: ClientKind,
    /// Optional user attribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}
