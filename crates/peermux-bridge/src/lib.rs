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

//! The bridge core: per-back-end session supervision, the name-keyed
//! category set with per-client mirrors, the unified data plane, the
//! history recorder, and fire-and-forget event hand-off.

/// Category manager with per-client mirrors and path warnings.
pub mod categories;
/// History recorder over the snapshot stream.
pub mod history;
/// Per-back-end session supervisor.
pub mod manager;
/// Apprise and event-script hand-off.
pub mod notify;
/// Filesystem path probing.
pub mod paths;
/// Unified data plane merging per-client snapshots.
pub mod plane;

pub use categories::{CategoryManager, CategoryPatch, PathWarning};
pub use history::HistoryRecorder;
pub use manager::{ClientManager, SupervisorOptions};
pub use notify::{NotifyOptions, Notifier};
pub use plane::{Snapshot, UnifiedPlane};
