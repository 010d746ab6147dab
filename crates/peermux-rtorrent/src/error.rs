//! Error types for the RPC adapter.

use peermux_core::{BridgeError, ClientKind};
use thiserror::Error;

/// Primary error type for line-RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A response line could not be parsed.
    #[error("rpc decode failed: {detail}")]
    Decode {
        /// Decode failure detail.
        detail: String,
    },
    /// The engine answered with an error envelope.
    #[error("rpc call failed: {message}")]
    Call {
        /// Engine-supplied failure message.
        message: String,
    },
    /// Socket failure under the session.
    #[error("rpc transport failure")]
    Io(#[from] std::io::Error),
    /// The session worker is gone.
    #[error("rpc session closed")]
    SessionClosed,
}

impl RpcError {
    /// Construct a decode failure.
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            detail: detail.into(),
        }
    }
}

impl From<RpcError> for BridgeError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Decode { detail } => Self::Protocol { detail },
            RpcError::Call { message } => Self::BadRequest { detail: message },
            RpcError::SessionClosed => Self::NotConnected {
                client: ClientKind::Rtorrent,
            },
            RpcError::Io(source) => Self::Transport {
                source: Box::new(source),
            },
        }
    }
}

/// Convenience alias for RPC operation results.
pub type RpcResult<T> = Result<T, RpcError>;
