//! Shared reqwest plumbing for the negotiator and the transport.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use sealdash_core::Config;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Identifies the client application on session init.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Binds a protected request to its negotiated session.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Build the HTTP client used for every call of one client instance.
pub(crate) fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let client_id = HeaderValue::from_str(&config.server.client_id)
        .map_err(|_| ClientError::Config("Invalid client id".into()))?;
    headers.insert(CLIENT_ID_HEADER, client_id);

    if let Some(token) = config.server.auth_token.as_deref().filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::Config("Invalid token format".into()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    // reqwest is built with rustls-no-provider. Err means already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Join the configured base URL and an endpoint path.
pub(crate) fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Turn a non-2xx response into `ClientError::Transport`.
///
/// The server's `{"error": ...}` or `{"message": ...}` text is used as the
/// message when present.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let fallback = status.canonical_reason().unwrap_or("Unknown").to_string();
    let message = resp
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| error_message(&body))
        .unwrap_or(fallback);
    Err(ClientError::Transport {
        status: Some(status.as_u16()),
        message,
    })
}

fn error_message(body: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}
