//! Two-step session handshake.
//!
//! `GET /init-session` yields a session id and the server's public key;
//! `POST /key-exchange` delivers a fresh symmetric key wrapped under that key
//! together with the client's own public key. Each step is valid from exactly
//! one state and a failed step leaves the negotiator in `Failed` for good.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sealdash_core::Config;
use sealdash_crypto::{
    CipherSuite, CryptoError, KeyPair, PublicKeyHandle, SessionCipher, SymmetricKey,
    decode_armored_public_key, encrypt_symmetric_key,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::http::{build_http_client, check_status, endpoint_url};
use crate::session::{Session, SessionHandle, SessionState, SessionStatus};
use crate::transport::EncryptedTransport;

const INIT_SESSION_PATH: &str = "/init-session";
const KEY_EXCHANGE_PATH: &str = "/key-exchange";

#[derive(Debug, Deserialize)]
struct InitSessionResponse {
    session_id: String,
    server_public_key: String,
}

#[derive(Debug, Serialize)]
struct KeyExchangeRequest<'a> {
    session_id: &'a str,
    encrypted_aes_key: String,
    client_public_key: String,
}

/// Output of the first handshake step.
#[derive(Debug)]
struct ServerOffer {
    session_id: String,
    server_public_key: PublicKeyHandle,
}

/// Drives one session from `Uninitialized` to `Established` or `Failed`.
#[derive(Debug)]
pub struct SessionNegotiator {
    http: reqwest::Client,
    base_url: String,
    suite: CipherSuite,
    handshake_timeout: Duration,
    max_decrypt_failures: u32,
    state: SessionState,
    offer: Option<ServerOffer>,
    status: watch::Sender<SessionStatus>,
}

impl SessionNegotiator {
    /// Create a negotiator for the configured server.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let http = build_http_client(config)?;
        Ok(Self::with_http_client(http, config))
    }

    /// Create a negotiator that shares an existing HTTP client.
    ///
    /// The client is expected to carry the `X-Client-ID` and authorization
    /// default headers already.
    pub fn with_http_client(http: reqwest::Client, config: &Config) -> Self {
        let suite = config.session.cipher_suite;
        if !suite.is_authenticated() {
            warn!(
                suite = %suite,
                "Cipher suite has no integrity protection; use only with servers that lack tag support"
            );
        }
        let (status, _) = watch::channel(SessionStatus::pending(SessionState::Uninitialized));
        Self {
            http,
            base_url: config.server.url.trim_end_matches('/').to_string(),
            suite,
            handshake_timeout: config.handshake_timeout(),
            max_decrypt_failures: config.session.max_decrypt_failures,
            state: SessionState::Uninitialized,
            offer: None,
            status,
        }
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Observer of this negotiator's state, for injection into transports.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.status.subscribe())
    }

    /// The established session, if the handshake has completed.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.status.borrow().session.clone()
    }

    /// An encrypted transport bound to this negotiator's session.
    ///
    /// May be created before the handshake; calls are refused until the
    /// session is established.
    pub fn transport(&self) -> EncryptedTransport {
        EncryptedTransport::new(
            self.http.clone(),
            self.base_url.clone(),
            self.handle(),
            self.max_decrypt_failures,
        )
    }

    /// Run both handshake steps under the handshake timeout.
    pub async fn negotiate(&mut self) -> Result<Arc<Session>> {
        let limit = self.handshake_timeout;
        let outcome = tokio::time::timeout(limit, async {
            self.initialize_session().await?;
            self.perform_key_exchange().await
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?limit, state = %self.state, "Handshake timed out");
                Err(self.fail(ClientError::HandshakeTimeout(limit)))
            }
        }
    }

    /// Step one: obtain a session id and the server's public key.
    pub async fn initialize_session(&mut self) -> Result<()> {
        self.expect_state(SessionState::Uninitialized)?;
        self.transition(SessionState::AwaitingServerKey);

        match self.fetch_server_offer().await {
            Ok(offer) => {
                info!(
                    session_id = %offer.session_id,
                    server_key = %offer.server_public_key.fingerprint(),
                    "Received server key"
                );
                self.offer = Some(offer);
                self.transition(SessionState::AwaitingExchangeAck);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Step two: deliver the wrapped symmetric key and the client public key.
    pub async fn perform_key_exchange(&mut self) -> Result<Arc<Session>> {
        self.expect_state(SessionState::AwaitingExchangeAck)?;
        let Some(offer) = self.offer.take() else {
            return Err(self.fail(ClientError::InvalidResponse(
                "no server offer recorded".into(),
            )));
        };

        match self.exchange_keys(offer).await {
            Ok(session) => {
                let session = Arc::new(session);
                self.state = SessionState::Established;
                self.status.send_replace(SessionStatus {
                    state: SessionState::Established,
                    session: Some(Arc::clone(&session)),
                });
                info!(
                    session_id = %session.session_id(),
                    server_key = %session.server_public_key().fingerprint(),
                    suite = %self.suite,
                    "Secure session established"
                );
                Ok(session)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn fetch_server_offer(&self) -> Result<ServerOffer> {
        let url = endpoint_url(&self.base_url, INIT_SESSION_PATH);
        debug!(%url, "Requesting session");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::transport(&e))?;
        let resp = check_status(resp).await?;
        let body: InitSessionResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("init-session body: {e}")))?;

        if body.session_id.trim().is_empty() {
            return Err(ClientError::InvalidResponse(
                "init-session returned an empty session id".into(),
            ));
        }
        let server_public_key = decode_armored_public_key(&body.server_public_key)?;
        Ok(ServerOffer {
            session_id: body.session_id,
            server_public_key,
        })
    }

    async fn exchange_keys(&self, offer: ServerOffer) -> Result<Session> {
        // RSA key generation is CPU-bound.
        let (key_pair, symmetric_key) = tokio::task::spawn_blocking(|| {
            Ok::<_, CryptoError>((KeyPair::generate()?, SymmetricKey::generate()?))
        })
        .await
        .map_err(|e| CryptoError::KeyGeneration(format!("key generation task failed: {e}")))??;

        let wrapped = encrypt_symmetric_key(&offer.server_public_key, &symmetric_key)?;
        let request = KeyExchangeRequest {
            session_id: &offer.session_id,
            encrypted_aes_key: STANDARD.encode(wrapped),
            client_public_key: key_pair.armored_public_key(),
        };

        let url = endpoint_url(&self.base_url, KEY_EXCHANGE_PATH);
        debug!(%url, session_id = %offer.session_id, "Sending key exchange");
        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::transport(&e))?;
        check_status(resp).await?;

        let cipher = SessionCipher::new(symmetric_key, self.suite)?;
        Ok(Session::new(
            offer.session_id,
            offer.server_public_key,
            key_pair,
            cipher,
        ))
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
        self.status.send_replace(SessionStatus::pending(next));
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        warn!(state = %self.state, error = %err, "Session handshake failed");
        self.offer = None;
        self.transition(SessionState::Failed);
        err
    }
}
