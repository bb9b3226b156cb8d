//! Client error types.

use std::time::Duration;

use sealdash_crypto::CryptoError;
use thiserror::Error;

use crate::session::SessionState;

/// Errors from session negotiation and encrypted calls.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An encrypted call was attempted without an established session.
    #[error("Session not established (state: {state})")]
    SessionNotEstablished { state: SessionState },

    /// Too many consecutive responses failed to decrypt.
    #[error("Session desynchronized after {failures} consecutive decrypt failures")]
    SessionDesynchronized { failures: u32 },

    /// Connection failure or non-2xx status.
    #[error("Transport error{}: {message}", .status.map_or_else(String::new, |s| format!(" ({s})")))]
    Transport { status: Option<u16>, message: String },

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// A handshake step was called out of order.
    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// The server answered 2xx with a body we could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether repeating the same call on the same session may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether the caller has to negotiate a new session before continuing.
    pub const fn requires_renegotiation(&self) -> bool {
        matches!(
            self,
            Self::SessionNotEstablished { .. }
                | Self::SessionDesynchronized { .. }
                | Self::Crypto(CryptoError::Decryption(_) | CryptoError::Deserialization(_))
        )
    }

    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<sealdash_core::Error> for ClientError {
    fn from(err: sealdash_core::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
