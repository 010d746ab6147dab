//! Default values and file names for the configuration model.
//!
//! # Design
//! - Centralize defaults so the model, loader, and docs stay consistent.
//! - Keep time-based defaults explicit for auditability.

/// Default HTTP bind address.
pub(crate) const BIND_ADDR: &str = "0.0.0.0";
/// Default HTTP port the facade listens on.
pub(crate) const HTTP_PORT: u16 = 8686;
/// Default data directory.
pub(crate) const DATA_DIR: &str = "/config";
/// Default EC port of the ED2K engine.
pub(crate) const AMULE_EC_PORT: u16 = 4712;
/// Default RPC address of the BitTorrent engine.
pub(crate) const RTORRENT_ADDR: &str = "127.0.0.1:5000";
/// Snapshot merge cadence in seconds.
pub(crate) const SNAPSHOT_SECS: u64 = 2;
/// Category reconciliation cadence in seconds.
pub(crate) const CATEGORY_SYNC_SECS: u64 = 300;
/// History refresh cadence in seconds.
pub(crate) const HISTORY_SECS: u64 = 5;
/// Success TTL of the hostname cache in seconds.
pub(crate) const RESOLVER_TTL_SECS: u64 = 6 * 60 * 60;
/// Failure TTL of the hostname cache in seconds.
pub(crate) const RESOLVER_FAILED_TTL_SECS: u64 = 15 * 60;
/// Hostname cache bound.
pub(crate) const RESOLVER_MAX_CACHE: usize = 1_024;
/// Reverse-DNS per-call deadline in seconds.
pub(crate) const RESOLVER_LOOKUP_SECS: u64 = 3;
/// Apprise/event-script kill timeout in seconds.
pub(crate) const SCRIPT_TIMEOUT_SECS: u64 = 30;
/// Configuration file name inside the data directory.
pub(crate) const CONFIG_FILE: &str = "peermux.json";
