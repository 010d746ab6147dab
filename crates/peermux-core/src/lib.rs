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
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Engine-agnostic bridge interfaces and DTOs shared across the workspace.
//!
//! The unified model merges records from the ED2K and BitTorrent back-ends
//! into one item/category vocabulary; the `EngineClient` trait is the seam
//! both engine crates implement.

/// Error types shared by bridge components.
pub mod error;
/// Magnet and ed2k link parsing and conversion.
pub mod links;
/// Unified data model DTOs.
pub mod model;
/// Engine client trait implemented by back-end adapters.
pub mod service;

pub use error::{BridgeError, BridgeResult};
pub use links::{Ed2kLink, MagnetLink, convert_magnet_to_ed2k};
pub use model::{
    AddRequest, Category, CategoryPriority, ClientItem, ClientKind, DEFAULT_CATEGORY,
    HistoryRecord, HistoryStatus, Item, ItemStatus, MirrorCategory, PathMappings, PeerInfo,
    SearchResult, ServerInfo, TransferStats,
};
pub use service::EngineClient;
