//! Error types for configuration handling.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but cannot be read.
    #[error("cannot read config at {path}")]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration document cannot be parsed.
    #[error("cannot parse config at {path}")]
    Parse {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
    /// The configuration parsed but violates an invariant.
    #[error("invalid config: {detail}")]
    Invalid {
        /// Human-readable violation description.
        detail: String,
    },
    /// A stored password hash is not a valid PHC string.
    #[error("stored password hash is malformed")]
    PasswordHash,
}

impl ConfigError {
    /// Construct a validation failure.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Invalid {
            detail: detail.into(),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
