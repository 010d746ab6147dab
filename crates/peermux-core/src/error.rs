//! Error types for bridge operations.

use std::error::Error;

use thiserror::Error;

use crate::model::ClientKind;

/// Primary error type for operations crossing the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The back-end session for the named client is not up.
    #[error("client {client} is not connected")]
    NotConnected {
        /// Client whose session is down.
        client: ClientKind,
    },
    /// A call exceeded its deadline.
    #[error("operation '{operation}' timed out")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Input failed validation before reaching a back-end.
    #[error("bad request: {detail}")]
    BadRequest {
        /// Human-readable validation failure.
        detail: String,
    },
    /// The operation conflicts with an invariant (e.g. deleting `Default`).
    #[error("conflict: {detail}")]
    Conflict {
        /// Human-readable conflict description.
        detail: String,
    },
    /// Socket or HTTP transport failure.
    #[error("transport failure")]
    Transport {
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A frame or response could not be decoded.
    #[error("protocol error: {detail}")]
    Protocol {
        /// Decode failure detail.
        detail: String,
    },
    /// The referenced hash is unknown to the bridge.
    #[error("hash {hash} not found")]
    NotFound {
        /// Missing 40-hex or 32-hex hash.
        hash: String,
    },
    /// An external collaborator (e.g. the Apprise CLI) is missing.
    #[error("{what} unavailable")]
    Unavailable {
        /// Name of the missing collaborator.
        what: &'static str,
    },
    /// The operation is not supported by the target client.
    #[error("operation '{operation}' not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl BridgeError {
    /// Wrap an arbitrary transport failure.
    pub fn transport(source: impl Error + Send + Sync + 'static) -> Self {
        Self::Transport {
            source: Box::new(source),
        }
    }

    /// Construct a validation failure.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest {
            detail: detail.into(),
        }
    }

    /// Construct a conflict failure.
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Conflict {
            detail: detail.into(),
        }
    }

    /// Construct a protocol decode failure.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }
}

/// Convenience alias for bridge operation results.
pub type BridgeResult<T> = Result<T, BridgeError>;
