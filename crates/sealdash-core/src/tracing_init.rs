//! Shared tracing/logging initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber, writing to stderr.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"sealdash=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Default filter string for a given log level, scoped to sealdash crates.
pub fn default_filter(level: &str) -> String {
    format!(
        "sealdash={level},sealdash_client={level},sealdash_core={level},sealdash_crypto={level}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_all_crates() {
        let filter = default_filter("debug");
        assert!(filter.contains("sealdash=debug"));
        assert!(filter.contains("sealdash_client=debug"));
        assert!(filter.contains("sealdash_core=debug"));
        assert!(filter.contains("sealdash_crypto=debug"));
    }
}
