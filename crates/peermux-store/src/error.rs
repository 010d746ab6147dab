//! Error types for store operations.

use std::path::PathBuf;

use peermux_core::BridgeError;
use thiserror::Error;

/// Primary error type for persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("store io failure at {path}")]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// A document could not be encoded or decoded.
    #[error("store codec failure at {path}")]
    Codec {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
    /// An insert would violate the bijection.
    #[error("mapping conflict: {detail}")]
    Conflict {
        /// Human-readable conflict description.
        detail: String,
    },
    /// The referenced key is absent.
    #[error("key {key} not found")]
    NotFound {
        /// Missing key.
        key: String,
    },
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { detail } => Self::Conflict { detail },
            StoreError::NotFound { key } => Self::NotFound { hash: key },
            other => Self::Transport {
                source: Box::new(other),
            },
        }
    }
}

/// Convenience alias for store operation results.
pub type StoreResult<T> = Result<T, StoreError>;
