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

//! File-backed persistence for the bridge's durable state.
//!
//! Everything in the data directory is a JSON document written through the
//! same atomic path: serialize to a temp file, fsync, rename over the
//! target. A missing file on first access is never an error.

/// Atomic JSON read/write helpers.
pub mod atomic;
/// Category definitions file.
pub mod categories;
/// Error types for store operations.
pub mod error;
/// Bidirectional ed2k ↔ magnet hash map with metadata sidecar.
pub mod hash_store;
/// Append-only history records file.
pub mod history;
/// Notification configuration file.
pub mod notifications;

pub use categories::CategoryStore;
pub use error::{StoreError, StoreResult};
pub use hash_store::{HashMeta, HashStore, synthesize_magnet_hash};
pub use history::HistoryStore;
pub use notifications::{
    NotificationEvents, NotificationService, NotificationsConfig, NotificationsStore, ServiceType,
};
