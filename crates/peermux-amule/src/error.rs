//! Error types for the EC adapter.

use peermux_core::{BridgeError, ClientKind};
use thiserror::Error;

/// Primary error type for EC protocol operations.
#[derive(Debug, Error)]
pub enum EcError {
    /// A frame violated the wire grammar.
    #[error("ec frame decode failed: {detail}")]
    Frame {
        /// Decode failure detail.
        detail: String,
    },
    /// The engine refused the authentication handshake.
    #[error("ec authentication rejected")]
    AuthRejected,
    /// The engine answered with an opcode the caller did not expect.
    #[error("unexpected ec response opcode {opcode:#04x}")]
    UnexpectedResponse {
        /// Opcode received.
        opcode: u8,
    },
    /// Socket failure under the session.
    #[error("ec transport failure")]
    Io(#[from] std::io::Error),
    /// The session worker is gone.
    #[error("ec session closed")]
    SessionClosed,
}

impl EcError {
    /// Construct a frame grammar failure.
    pub fn frame(detail: impl Into<String>) -> Self {
        Self::Frame {
            detail: detail.into(),
        }
    }
}

impl From<EcError> for BridgeError {
    fn from(err: EcError) -> Self {
        match err {
            EcError::Frame { detail } => Self::Protocol { detail },
            EcError::UnexpectedResponse { opcode } => Self::Protocol {
                detail: format!("unexpected ec opcode {opcode:#04x}"),
            },
            EcError::AuthRejected => Self::BadRequest {
                detail: "ec password rejected".to_string(),
            },
            EcError::SessionClosed => Self::NotConnected {
                client: ClientKind::Amule,
            },
            EcError::Io(source) => Self::Transport {
                source: Box::new(source),
            },
        }
    }
}

/// Convenience alias for EC operation results.
pub type EcResult<T> = Result<T, EcError>;
