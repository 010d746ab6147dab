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

//! Logging initialisation for the bridge.
//!
//! # Design
//! - Centralises tracing setup (fmt or JSON) behind a single entry point.
//! - Records the build SHA once so every module logs the same identity.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD_SHA: OnceCell<String> = OnceCell::new();

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g. `info`, `debug`).
    pub level: &'a str,
    /// Output format selection.
    pub format: LogFormat,
    /// Build identifier recorded in structured logs.
    pub build_sha: &'a str,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            build_sha: build_sha(),
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Structured JSON objects.
    Json,
    /// Human-readable output.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a subscriber has already been installed globally.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    BUILD_SHA.set(config.build_sha.to_string()).ok();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .context("failed to install json subscriber")?,
        LogFormat::Pretty => registry
            .with(fmt::layer())
            .try_init()
            .context("failed to install fmt subscriber")?,
    }
    Ok(())
}

/// Access the build SHA recorded during logging initialisation.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD_SHA.get().map_or("dev", String::as_str)
}
