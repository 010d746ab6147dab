//! Binary error types.

use thiserror::Error;

/// Failures that abort the boot sequence.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration failure")]
    Config(#[from] peermux_config::ConfigError),
    /// A persistent store could not be opened.
    #[error("store failure")]
    Store(#[from] peermux_store::StoreError),
    /// A bridge component could not be constructed.
    #[error("bridge failure")]
    Bridge(#[from] peermux_core::BridgeError),
    /// Logging could not be installed.
    #[error("telemetry failure: {0}")]
    Telemetry(String),
    /// The HTTP listener failed.
    #[error("server failure")]
    Server(#[from] std::io::Error),
}

/// Convenience alias for boot results.
pub type AppResult<T> = Result<T, AppError>;
