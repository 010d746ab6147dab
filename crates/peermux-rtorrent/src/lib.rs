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

//! BitTorrent engine adapter over a line-oriented RPC.
//!
//! One stateful TCP session carries newline-delimited JSON envelopes.
//! Concurrent calls multiplex over the session: writes stay FIFO at the
//! wire, replies correlate by id so the engine may answer out of order,
//! and a per-session concurrency cap bounds the outstanding window.

/// BitTorrent session client implementing the engine seam.
pub mod client;
/// Error types for the RPC adapter.
pub mod error;
/// Decoded record shapes and state normalisation.
pub mod types;
/// Wire envelopes and value coercion.
pub mod wire;

pub use client::{RtorrentClient, RtorrentConfig};
pub use error::{RpcError, RpcResult};
