#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]
#![allow(unexpected_cfgs)]

//! Core event bus for the Peermux bridge.
//!
//! The bus provides a typed event enum, sequential identifiers, and replay
//! of recent events for late subscribers. Internally it uses
//! `tokio::broadcast` with a bounded buffer; on overflow the oldest events
//! are dropped, matching the desired backpressure behaviour.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;

/// Identifier assigned to each event emitted by the bridge.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Lifecycle state of a back-end client session supervisor.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    /// Configuration flag off; no session attempted.
    Disabled,
    /// Dialing and handshaking.
    Connecting,
    /// Session up and serving calls.
    Connected,
    /// A probe or call failed; short-timer retries in progress.
    Degraded,
    /// Session lost; reconnect cycle running.
    Disconnected,
}

impl ClientState {
    /// Stable lowercase identifier for wire payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed domain events surfaced across the bridge.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A record was admitted through the bridge.
    DownloadAdded {
        /// 40-hex unified hash.
        hash: String,
        /// Display name at admission.
        name: String,
        /// Owning back-end identifier (`amule`/`rtorrent`).
        client: String,
    },
    /// A record reached 100 % for the first time.
    DownloadFinished {
        /// 40-hex unified hash.
        hash: String,
        /// Display name at completion.
        name: String,
        /// Owning back-end identifier.
        client: String,
    },
    /// A record was moved to a different category.
    CategoryChanged {
        /// 40-hex unified hash.
        hash: String,
        /// New unified category name.
        category: String,
    },
    /// A completed payload was relocated on disk.
    FileMoved {
        /// 40-hex unified hash.
        hash: String,
        /// Destination path.
        path: String,
    },
    /// A payload was deleted from disk.
    FileDeleted {
        /// 40-hex unified hash.
        hash: String,
        /// Display name at deletion.
        name: String,
    },
    /// A client supervisor transitioned between states.
    ClientStateChanged {
        /// Back-end identifier.
        client: String,
        /// New supervisor state.
        state: ClientState,
    },
    /// The unified category set changed.
    CategoriesUpdated,
}

impl Event {
    /// Machine-friendly discriminator for subscribers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DownloadAdded { .. } => "download_added",
            Self::DownloadFinished { .. } => "download_finished",
            Self::CategoryChanged { .. } => "category_changed",
            Self::FileMoved { .. } => "file_moved",
            Self::FileDeleted { .. } => "file_deleted",
            Self::ClientStateChanged { .. } => "client_state_changed",
            Self::CategoriesUpdated => "categories_updated",
        }
    }

    /// Hash the event refers to, when it targets a single record.
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::DownloadAdded { hash, .. }
            | Self::DownloadFinished { hash, .. }
            | Self::CategoryChanged { hash, .. }
            | Self::FileMoved { hash, .. }
            | Self::FileDeleted { hash, .. } => Some(hash),
            Self::ClientStateChanged { .. } | Self::CategoriesUpdated => None,
        }
    }
}

/// Metadata wrapper around events carrying the id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than
    /// `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events were published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events from the replay backlog first and the
/// live broadcast channel afterwards.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    fn sample_event(id: usize) -> Event {
        Event::DownloadAdded {
            hash: format!("{id:040x}"),
            name: format!("file-{id}"),
            client: "amule".to_string(),
        }
    }

    #[test]
    fn event_kinds_cover_all_variants() {
        let hash = "0".repeat(40);
        let cases = [
            (
                Event::DownloadAdded {
                    hash: hash.clone(),
                    name: "a".into(),
                    client: "amule".into(),
                },
                "download_added",
            ),
            (
                Event::DownloadFinished {
                    hash: hash.clone(),
                    name: "a".into(),
                    client: "rtorrent".into(),
                },
                "download_finished",
            ),
            (
                Event::CategoryChanged {
                    hash: hash.clone(),
                    category: "Movies".into(),
                },
                "category_changed",
            ),
            (
                Event::FileMoved {
                    hash: hash.clone(),
                    path: "/mnt/m".into(),
                },
                "file_moved",
            ),
            (
                Event::FileDeleted {
                    hash: hash.clone(),
                    name: "a".into(),
                },
                "file_deleted",
            ),
            (
                Event::ClientStateChanged {
                    client: "amule".into(),
                    state: ClientState::Connected,
                },
                "client_state_changed",
            ),
            (Event::CategoriesUpdated, "categories_updated"),
        ];
        for (event, expected) in cases {
            assert_eq!(event.kind(), expected);
        }
    }

    #[test]
    fn event_hash_targets_single_records() {
        let hash = "f".repeat(40);
        let added = Event::DownloadAdded {
            hash: hash.clone(),
            name: "a".into(),
            client: "amule".into(),
        };
        assert_eq!(added.hash(), Some(hash.as_str()));
        assert!(Event::CategoriesUpdated.hash().is_none());
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().map(|e| e.id), Some(3));
        assert_eq!(received.last().map(|e| e.id), Some(5));
    }

    #[tokio::test]
    async fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none());
        let published = bus.publish(sample_event(0));
        assert_eq!(bus.last_event_id(), Some(published));
    }

    #[tokio::test]
    async fn ring_overflow_drops_oldest() {
        let bus = EventBus::with_capacity(2);
        for i in 0..4 {
            let _ = bus.publish(sample_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let first = timeout(RECV_TIMEOUT, stream.next())
            .await
            .expect("stream stalled")
            .expect("stream closed");
        assert_eq!(first.id, 3, "events 1 and 2 fell off the ring");
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(stream.next().await.is_none());
    }
}
