#![forbid(unsafe_code)]
#![recursion_limit = "512"]
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

//! HTTP and WebSocket surface of the bridge: the qBittorrent WebUI v2
//! facade, the Torznab indexer, and the coalescing WebSocket fan-out.

/// Shared add/delete dispatch used by the facade and WebSocket actions.
pub mod actions;
/// qBittorrent compatibility facade (`/api/v2`).
pub mod compat_qb;
/// RFC9457-style API error wrapper.
pub mod errors;
/// Liveness and per-client state reporting.
pub mod health;
/// Frozen qBittorrent preferences document.
pub mod preferences;
/// Router construction and server host.
pub mod router;
/// Shared application state.
pub mod state;
/// Torznab indexer endpoint.
pub mod torznab;
/// WebSocket broadcaster and action dispatch.
pub mod ws;

pub use router::ApiServer;
pub use state::ApiState;
