//! Encrypted request/response channel over an established session.
//!
//! Request bodies go out as `{"encrypted_data": <envelope>}` with the
//! `X-Session-ID` header. Responses are unwrapped from the same shape, or
//! treated as a bare envelope when `encrypted_data` is absent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use reqwest::Method;
use sealdash_crypto::CryptoError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::http::{SESSION_ID_HEADER, check_status, endpoint_url};
use crate::session::{Session, SessionHandle, SessionState};

/// Field that carries the envelope in request and response bodies.
pub const ENCRYPTED_DATA_FIELD: &str = "encrypted_data";

/// Cloneable handle for encrypted calls. Clones share the failure counter.
#[derive(Debug, Clone)]
pub struct EncryptedTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
    max_decrypt_failures: u32,
    consecutive_failures: AtomicU32,
    desynchronized: AtomicBool,
}

impl EncryptedTransport {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: SessionHandle,
        max_decrypt_failures: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.into(),
                session,
                max_decrypt_failures: max_decrypt_failures.max(1),
                consecutive_failures: AtomicU32::new(0),
                desynchronized: AtomicBool::new(false),
            }),
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Whether the failure threshold was reached. Sticky for this transport.
    pub fn is_desynchronized(&self) -> bool {
        self.inner.desynchronized.load(Ordering::SeqCst)
    }

    /// POST `payload` encrypted and decrypt the response into `R`.
    pub async fn send_encrypted<T, R>(&self, endpoint: &str, payload: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request_encrypted(Method::POST, endpoint, Some(payload))
            .await
    }

    /// Bodiless request whose response is still encrypted.
    pub async fn fetch_encrypted<R: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
    ) -> Result<R> {
        self.request_encrypted::<(), R>(method, endpoint, None).await
    }

    /// General encrypted call.
    ///
    /// Refused with `SessionNotEstablished` or `SessionDesynchronized` before
    /// any network I/O when the session is not usable.
    pub async fn request_encrypted<T, R>(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&T>,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let session = self.active_session()?;
        let url = endpoint_url(&self.inner.base_url, endpoint);

        let mut request = self
            .inner
            .http
            .request(method.clone(), &url)
            .header(SESSION_ID_HEADER, session.session_id());
        if let Some(payload) = payload {
            let envelope = session.cipher().encrypt(payload)?;
            request = request.json(&json!({ "encrypted_data": envelope.to_wire() }));
        }

        debug!(%method, endpoint, session_id = %session.session_id(), "Encrypted request");
        let resp = request
            .send()
            .await
            .map_err(|e| ClientError::transport(&e))?;
        let resp = check_status(resp).await?;

        let body = match resp.json::<Value>().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                return Err(self.record_failure(CryptoError::Decryption(format!(
                    "response body is not JSON: {e}"
                ))));
            }
            Err(e) => return Err(ClientError::transport(&e)),
        };
        self.open(&session, &body)
    }

    /// Decrypt a response body received outside this transport.
    pub fn receive_encrypted<R: DeserializeOwned>(&self, body: &Value) -> Result<R> {
        let session = self.active_session()?;
        self.open(&session, body)
    }

    fn open<R: DeserializeOwned>(&self, session: &Session, body: &Value) -> Result<R> {
        let envelope = match body {
            Value::Object(map) => map.get(ENCRYPTED_DATA_FIELD).unwrap_or(body),
            other => other,
        };
        match session.cipher().decrypt_wire(envelope) {
            Ok(value) => {
                self.inner.consecutive_failures.store(0, Ordering::SeqCst);
                Ok(value)
            }
            Err(e) => Err(self.record_failure(e)),
        }
    }

    fn active_session(&self) -> Result<Arc<Session>> {
        if self.is_desynchronized() {
            return Err(ClientError::SessionDesynchronized {
                failures: self.consecutive_failures(),
            });
        }
        self.inner.session.established()
    }

    fn record_failure(&self, err: CryptoError) -> ClientError {
        let failures = self
            .inner
            .consecutive_failures
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        if failures >= self.inner.max_decrypt_failures {
            if !self.inner.desynchronized.swap(true, Ordering::SeqCst) {
                warn!(
                    failures,
                    error = %err,
                    "Session desynchronized; renegotiation required"
                );
            }
        } else {
            warn!(failures, error = %err, "Failed to decrypt response");
        }
        ClientError::Crypto(err)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use sealdash_core::Config;

    use super::*;
    use crate::negotiator::SessionNegotiator;

    fn pending_transport() -> EncryptedTransport {
        let mut config = Config::default();
        config.server.url = "http://127.0.0.1:9".into();
        SessionNegotiator::new(&config).unwrap().transport()
    }

    #[test]
    fn receive_before_handshake_is_refused() {
        let transport = pending_transport();
        let err = transport
            .receive_encrypted::<Value>(&json!({ "encrypted_data": { "iv": "", "data": "" } }))
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::SessionNotEstablished {
                state: SessionState::Uninitialized
            }
        ));
        assert_eq!(transport.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn send_before_handshake_is_refused() {
        let transport = pending_transport();
        let err = transport
            .send_encrypted::<_, Value>("/api/products", &json!({ "name": "Widget" }))
            .await
            .unwrap_err();
        assert!(err.requires_renegotiation());
        assert!(!transport.is_desynchronized());
    }

    #[test]
    fn clones_share_state() {
        let transport = pending_transport();
        let clone = transport.clone();
        clone.inner.desynchronized.store(true, Ordering::SeqCst);
        assert!(transport.is_desynchronized());
    }
}
