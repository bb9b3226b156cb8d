//! In-process dashboard server speaking the session protocol.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sealdash_core::Config;
use sealdash_crypto::{
    CipherSuite, EncryptedEnvelope, KeyPair, SessionCipher, SymmetricKey,
    decode_armored_public_key,
};
use serde_json::{Value, json};

/// How the mock wraps encrypted responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"encrypted_data": {iv, data[, tag]}}`
    Object,
    /// `{"encrypted_data": "<base64 of the envelope JSON>"}`
    Base64,
    /// The envelope object as the whole body.
    Bare,
    /// The answer as unencrypted JSON.
    PlainJson,
    /// A `text/plain` body that is not JSON at all.
    PlainText,
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub session_id: String,
    pub suite: CipherSuite,
    pub key_exchange_status: StatusCode,
    pub init_delay: Duration,
    pub malformed_key: bool,
    pub shape: ResponseShape,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            session_id: "sess-123".into(),
            suite: CipherSuite::default(),
            key_exchange_status: StatusCode::OK,
            init_delay: Duration::ZERO,
            malformed_key: false,
            shape: ResponseShape::Object,
        }
    }
}

/// One protected request as the server saw it.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: Method,
    /// Path plus query string.
    pub target: String,
    pub session_id: Option<String>,
    pub authorization: Option<String>,
    pub envelope: Option<Value>,
    pub payload: Option<Value>,
}

pub struct MockState {
    options: MockOptions,
    server_keys: KeyPair,
    cipher: Mutex<Option<SessionCipher>>,
    pub init_hits: AtomicUsize,
    pub exchange_hits: AtomicUsize,
    pub api_hits: AtomicUsize,
    pub client_ids: Mutex<Vec<String>>,
    pub client_public_keys: Mutex<Vec<String>>,
    pub received: Mutex<Vec<ReceivedRequest>>,
    responses: Mutex<HashMap<String, Value>>,
    statuses: Mutex<HashMap<String, StatusCode>>,
    corrupt_responses: AtomicBool,
}

pub struct MockServer {
    pub url: String,
    pub state: Arc<MockState>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let server_keys = tokio::task::spawn_blocking(KeyPair::generate)
            .await
            .unwrap()
            .unwrap();
        let state = Arc::new(MockState {
            options,
            server_keys,
            cipher: Mutex::new(None),
            init_hits: AtomicUsize::new(0),
            exchange_hits: AtomicUsize::new(0),
            api_hits: AtomicUsize::new(0),
            client_ids: Mutex::new(Vec::new()),
            client_public_keys: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            corrupt_responses: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/init-session", get(init_session))
            .route("/key-exchange", post(key_exchange))
            .fallback(protected)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Client config pointing at this server with matching suite.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.server.url.clone_from(&self.url);
        config.session.cipher_suite = self.state.options.suite;
        config.session.handshake_timeout_secs = 10;
        config.server.request_timeout_secs = 10;
        config
    }

    /// Decrypted body the server answers with for `path` (query ignored).
    pub fn respond(&self, path: &str, body: Value) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(path.to_string(), body);
    }

    /// Plain error status for `path` instead of an encrypted answer.
    pub fn fail_with(&self, path: &str, status: StatusCode) {
        self.state
            .statuses
            .lock()
            .unwrap()
            .insert(path.to_string(), status);
    }

    /// Encrypt responses under a random key the client does not know.
    pub fn corrupt_responses(&self, on: bool) {
        self.state.corrupt_responses.store(on, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn api_hits(&self) -> usize {
        self.state.api_hits.load(Ordering::SeqCst)
    }

    pub fn exchange_hits(&self) -> usize {
        self.state.exchange_hits.load(Ordering::SeqCst)
    }

    pub fn init_hits(&self) -> usize {
        self.state.init_hits.load(Ordering::SeqCst)
    }
}

async fn init_session(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.init_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(id) = header(&headers, "x-client-id") {
        state.client_ids.lock().unwrap().push(id);
    }
    if !state.options.init_delay.is_zero() {
        tokio::time::sleep(state.options.init_delay).await;
    }

    let server_public_key = if state.options.malformed_key {
        "-----BEGIN PUBLIC KEY-----\nbm90IGEga2V5\n-----END PUBLIC KEY-----\n".to_string()
    } else {
        state.server_keys.armored_public_key()
    };
    Json(json!({
        "session_id": state.options.session_id,
        "server_public_key": server_public_key,
    }))
    .into_response()
}

async fn key_exchange(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.exchange_hits.fetch_add(1, Ordering::SeqCst);
    if !state.options.key_exchange_status.is_success() {
        return (
            state.options.key_exchange_status,
            Json(json!({ "error": "Key exchange rejected" })),
        )
            .into_response();
    }
    if body["session_id"] != json!(state.options.session_id) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Unknown session" })))
            .into_response();
    }

    let client_key = body["client_public_key"].as_str().unwrap().to_string();
    decode_armored_public_key(&client_key).unwrap();
    state.client_public_keys.lock().unwrap().push(client_key);

    let wrapped = STANDARD
        .decode(body["encrypted_aes_key"].as_str().unwrap())
        .unwrap();
    let key = state.server_keys.decrypt_symmetric_key(&wrapped).unwrap();
    let cipher = SessionCipher::new(key, state.options.suite).unwrap();
    *state.cipher.lock().unwrap() = Some(cipher);

    Json(json!({ "status": "success" })).into_response()
}

async fn protected(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.api_hits.fetch_add(1, Ordering::SeqCst);
    let session_id = header(&headers, "x-session-id");
    let authorization = header(&headers, "authorization");

    let (envelope, payload) = if body.is_empty() {
        (None, None)
    } else {
        let wrapper: Value = serde_json::from_slice(&body).unwrap();
        let envelope = wrapper["encrypted_data"].clone();
        let guard = state.cipher.lock().unwrap();
        let cipher = guard.as_ref().unwrap();
        let payload: Value = cipher.decrypt_wire(&envelope).unwrap();
        (Some(envelope), Some(payload))
    };

    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    state.received.lock().unwrap().push(ReceivedRequest {
        method,
        target,
        session_id: session_id.clone(),
        authorization,
        envelope,
        payload,
    });

    if session_id.as_deref() != Some(state.options.session_id.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid session" })))
            .into_response();
    }
    if let Some(status) = state.statuses.lock().unwrap().get(uri.path()).copied() {
        return (status, Json(json!({ "error": "Simulated failure" }))).into_response();
    }

    let answer = state
        .responses
        .lock()
        .unwrap()
        .get(uri.path())
        .cloned()
        .unwrap_or_else(|| json!({}));
    match state.options.shape {
        ResponseShape::PlainJson => return Json(answer).into_response(),
        ResponseShape::PlainText => return (StatusCode::OK, "OK").into_response(),
        _ => {}
    }
    let envelope = if state.corrupt_responses.load(Ordering::SeqCst) {
        let stranger = SessionCipher::new(SymmetricKey::generate().unwrap(), state.options.suite)
            .unwrap();
        stranger.encrypt(&answer).unwrap()
    } else {
        let guard = state.cipher.lock().unwrap();
        guard.as_ref().unwrap().encrypt(&answer).unwrap()
    };

    let body = match state.options.shape {
        ResponseShape::Object => json!({ "encrypted_data": envelope.to_wire() }),
        ResponseShape::Base64 => json!({ "encrypted_data": envelope.to_base64_json() }),
        ResponseShape::Bare | ResponseShape::PlainJson | ResponseShape::PlainText => {
            envelope.to_wire()
        }
    };
    Json(body).into_response()
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parse an envelope as sent on the wire, for assertions on its shape.
pub fn parse_envelope(value: &Value) -> EncryptedEnvelope {
    EncryptedEnvelope::from_wire(value).unwrap()
}
