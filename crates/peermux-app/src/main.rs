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

//! Binary entrypoint that wires the bridge services together and blocks
//! until shutdown.

/// Application bootstrap wiring.
pub mod bootstrap;
/// Binary error types.
pub mod error;
/// Background task lifecycle.
pub mod orchestrator;

use error::AppResult;

/// Bootstraps the bridge and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    bootstrap::run_app().await
}
