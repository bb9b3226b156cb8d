//! Negotiated session state and the handle transports observe it through.

use std::fmt;
use std::sync::Arc;

use sealdash_crypto::{KeyPair, PublicKeyHandle, SessionCipher};
use tokio::sync::watch;

use crate::error::{ClientError, Result};

/// Handshake progress.
///
/// `Established` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    AwaitingServerKey,
    AwaitingExchangeAck,
    Established,
    Failed,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingServerKey => "awaiting_server_key",
            Self::AwaitingExchangeAck => "awaiting_exchange_ack",
            Self::Established => "established",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Established | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The security context produced by a completed handshake.
///
/// Immutable once built; dropped (and its key material zeroized) with the
/// last `Arc` holding it.
#[derive(Debug)]
pub struct Session {
    session_id: String,
    server_public_key: PublicKeyHandle,
    client_key_pair: KeyPair,
    cipher: SessionCipher,
}

impl Session {
    pub(crate) const fn new(
        session_id: String,
        server_public_key: PublicKeyHandle,
        client_key_pair: KeyPair,
        cipher: SessionCipher,
    ) -> Self {
        Self {
            session_id,
            server_public_key,
            client_key_pair,
            cipher,
        }
    }

    /// Server-issued id, sent as `X-Session-ID`.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub const fn server_public_key(&self) -> &PublicKeyHandle {
        &self.server_public_key
    }

    pub const fn client_key_pair(&self) -> &KeyPair {
        &self.client_key_pair
    }

    pub const fn cipher(&self) -> &SessionCipher {
        &self.cipher
    }
}

/// What the negotiator publishes on its watch channel.
#[derive(Debug, Clone)]
pub(crate) struct SessionStatus {
    pub state: SessionState,
    pub session: Option<Arc<Session>>,
}

impl SessionStatus {
    pub const fn pending(state: SessionState) -> Self {
        Self {
            state,
            session: None,
        }
    }
}

/// Read side of a negotiator's session status.
///
/// Cheap to clone; every clone sees the same state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub(crate) const fn new(rx: watch::Receiver<SessionStatus>) -> Self {
        Self { rx }
    }

    pub fn state(&self) -> SessionState {
        self.rx.borrow().state
    }

    /// The established session, or `SessionNotEstablished` with the current state.
    pub fn established(&self) -> Result<Arc<Session>> {
        let status = self.rx.borrow();
        match (&status.session, status.state) {
            (Some(session), SessionState::Established) => Ok(Arc::clone(session)),
            (_, state) => Err(ClientError::SessionNotEstablished { state }),
        }
    }

    /// Wait until the handshake reaches a terminal state.
    ///
    /// Returns the last published state if the negotiator is dropped first.
    pub async fn wait_terminal(&mut self) -> SessionState {
        let reached = self
            .rx
            .wait_for(|status| status.state.is_terminal())
            .await
            .map(|status| status.state);
        match reached {
            Ok(state) => state,
            Err(_) => self.rx.borrow().state,
        }
    }
}
