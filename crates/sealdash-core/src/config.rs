//! Configuration resolution for sealdash.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/sealdash/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`SEALDASH_*`)
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files may be partial: JSON objects are merged key by key over the lower
//! layers before deserializing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sealdash_crypto::CipherSuite;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Complete sealdash configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Where and how to reach the dashboard API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the API server (e.g. `https://licenses.example.com`).
    pub url: String,
    /// Sent as `X-Client-ID` on session init.
    pub client_id: String,
    /// Bearer token for the dashboard endpoints. Never written back to disk.
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000".to_string(),
            client_id: "x-client".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Handshake and envelope settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub handshake_timeout_secs: u64,
    pub cipher_suite: CipherSuite,
    /// Consecutive undecryptable responses before the session is considered
    /// desynchronized and must be renegotiated.
    pub max_decrypt_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 30,
            cipher_suite: CipherSuite::default(),
            max_decrypt_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.session.handshake_timeout_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(Error::Config("server.url is empty".into()));
        }
        if !(self.server.url.starts_with("http://") || self.server.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server.url must start with http:// or https://, got {:?}",
                self.server.url
            )));
        }
        if self.server.client_id.trim().is_empty() {
            return Err(Error::Config("server.client_id is empty".into()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(Error::Config("server.request_timeout_secs must be > 0".into()));
        }
        if self.session.handshake_timeout_secs == 0 {
            return Err(Error::Config(
                "session.handshake_timeout_secs must be > 0".into(),
            ));
        }
        if self.session.max_decrypt_failures == 0 {
            return Err(Error::Config(
                "session.max_decrypt_failures must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sealdash").join("settings.json"))
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` must exist when given; the global file is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    load_layers(global_config_path().as_deref(), explicit, |key| {
        std::env::var(key).ok()
    })
}

/// Resolve defaults, files and environment (via `lookup`) into a config.
///
/// The result is not validated: callers layer their own overrides on top and
/// call [`Config::validate`] once at the end.
pub fn load_layers<F>(global: Option<&Path>, explicit: Option<&Path>, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(path) = global {
        if path.exists() {
            merge_json(&mut merged, read_json(path)?);
        }
    }
    if let Some(path) = explicit {
        merge_json(&mut merged, read_json(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;
    apply_env_overrides(&mut config, lookup);
    Ok(config)
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively merge `overlay` into `base`; non-object values replace.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!(key, value = raw, "Ignoring invalid environment override");
    }
    parsed
}

/// Apply `SEALDASH_*` overrides. Unparseable values are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("SEALDASH_SERVER_URL") {
        config.server.url = val;
    }
    if let Some(val) = lookup("SEALDASH_CLIENT_ID") {
        config.server.client_id = val;
    }
    if let Some(val) = lookup("SEALDASH_AUTH_TOKEN") {
        config.server.auth_token = Some(val);
    }
    if let Some(n) = lookup("SEALDASH_REQUEST_TIMEOUT_SECS")
        .and_then(|v| parse_env("SEALDASH_REQUEST_TIMEOUT_SECS", &v))
    {
        config.server.request_timeout_secs = n;
    }
    if let Some(n) = lookup("SEALDASH_HANDSHAKE_TIMEOUT_SECS")
        .and_then(|v| parse_env("SEALDASH_HANDSHAKE_TIMEOUT_SECS", &v))
    {
        config.session.handshake_timeout_secs = n;
    }
    if let Some(suite) =
        lookup("SEALDASH_CIPHER_SUITE").and_then(|v| parse_env("SEALDASH_CIPHER_SUITE", &v))
    {
        config.session.cipher_suite = suite;
    }
    if let Some(n) = lookup("SEALDASH_MAX_DECRYPT_FAILURES")
        .and_then(|v| parse_env("SEALDASH_MAX_DECRYPT_FAILURES", &v))
    {
        config.session.max_decrypt_failures = n;
    }
    if let Some(val) = lookup("SEALDASH_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Some(json) =
        lookup("SEALDASH_LOG_JSON").and_then(|v| parse_env("SEALDASH_LOG_JSON", &v))
    {
        config.logging.json = json;
    }
}
