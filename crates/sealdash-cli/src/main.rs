//! sealdash CLI
//!
//! Opens an encrypted session with the license dashboard API and runs one
//! dashboard command through it, printing the decrypted JSON.

mod commands;
mod overrides;

use clap::Parser;
use sealdash_client::SecureClient;
use sealdash_core::config::load_config;
use sealdash_core::tracing_init::{default_filter, init_tracing};
use tracing::{error, info};

use crate::commands::Command;
use crate::overrides::GlobalArgs;

#[derive(Parser, Debug)]
#[command(name = "sealdash")]
#[command(version, about = "Encrypted client for the license dashboard API", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.global.config.as_deref())?;
    cli.global.apply(&mut config);
    config.validate()?;

    init_tracing(&default_filter(&config.logging.level), config.logging.json);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.url,
        suite = %config.session.cipher_suite,
        "Starting sealdash CLI"
    );

    let server = config.server.url.clone();
    let client = match SecureClient::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Handshake failed");
            anyhow::bail!("Could not establish a secure session with {server}");
        }
    };

    commands::run(&client, cli.command).await
}
