//! Global CLI flags and how they override the resolved configuration.

use std::path::PathBuf;

use clap::Args;
use sealdash_core::Config;
use sealdash_crypto::CipherSuite;

/// Flags accepted before or after any subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// API server base URL
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Value sent as X-Client-ID when opening a session
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Bearer token for dashboard endpoints
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Explicit config file, layered over the global one
    #[arg(long, global = true, env = "SEALDASH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Envelope cipher suite: aes256-cbc-hmac-sha256 or aes256-cbc
    #[arg(long, global = true)]
    pub cipher_suite: Option<CipherSuite>,

    /// Emit JSON log lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Apply flags on top of file and environment configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server.url.clone_from(server);
        }
        if let Some(client_id) = &self.client_id {
            config.server.client_id.clone_from(client_id);
        }
        if let Some(token) = &self.token {
            config.server.auth_token = Some(token.clone());
        }
        if let Some(suite) = self.cipher_suite {
            config.session.cipher_suite = suite;
        }
        if self.log_json {
            config.logging.json = true;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_leave_config_alone() {
        let mut config = Config::default();
        config.server.url = "https://from-file.example".into();
        GlobalArgs::default().apply(&mut config);
        assert_eq!(config.server.url, "https://from-file.example");
        assert!(!config.logging.json);
    }

    #[test]
    fn flags_win_over_config() {
        let args = GlobalArgs {
            server: Some("https://flag.example".into()),
            client_id: Some("ops".into()),
            token: Some("tok".into()),
            cipher_suite: Some(CipherSuite::Aes256Cbc),
            log_json: true,
            ..GlobalArgs::default()
        };
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.server.url, "https://flag.example");
        assert_eq!(config.server.client_id, "ops");
        assert_eq!(config.server.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.session.cipher_suite, CipherSuite::Aes256Cbc);
        assert!(config.logging.json);
    }

    #[test]
    fn server_flag_replaces_invalid_env_url() {
        let mut config = sealdash_core::config::load_layers(None, None, |key| {
            (key == "SEALDASH_SERVER_URL").then(|| "localhost:5000".to_string())
        })
        .unwrap();
        assert!(config.validate().is_err());

        let args = GlobalArgs {
            server: Some("http://localhost:5000".into()),
            ..GlobalArgs::default()
        };
        args.apply(&mut config);
        config.validate().unwrap();
    }
}
