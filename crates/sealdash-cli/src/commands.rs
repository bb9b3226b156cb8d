//! CLI subcommands.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use anyhow::Context;
use clap::{Args, Subcommand};
use sealdash_client::api::ListQuery;
use sealdash_client::{Method, SecureClient};
use serde_json::{Value, json};

/// Subcommand actions.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Negotiate a session and print its id and the server key fingerprint
    Handshake,
    /// Raw encrypted call against any endpoint
    Call {
        /// Endpoint path, e.g. /api/licenses/stats
        endpoint: String,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
        /// JSON body to encrypt and send
        #[arg(long)]
        data: Option<String>,
    },
    /// License statistics
    Stats,
    /// List products
    Products {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Every product, unpaged
    AllProducts,
    /// Statistics for one product
    ProductStats { id: i64 },
    /// Delete a product
    DeleteProduct { id: i64 },
    /// Show one license
    License { key: String },
    /// List licenses
    Licenses(ListArgs),
    /// List product settings
    Settings(ListArgs),
    /// Show the setting of one product
    Setting { product_id: i64 },
    /// Delete the setting of one product
    DeleteSetting { product_id: i64 },
    /// List users
    Users(ListArgs),
    /// Revoke a license
    Revoke { key: String },
    /// Delete a license
    DeleteLicense { key: String },
    /// Change a user's role
    SetRole { username: String, role: String },
    /// Delete a user
    DeleteUser { username: String },
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub per_page: Option<u32>,
    /// Search text
    #[arg(long)]
    pub query: Option<String>,
}

impl From<ListArgs> for ListQuery {
    fn from(args: ListArgs) -> Self {
        Self {
            page: args.page,
            per_page: args.per_page,
            query: args.query,
        }
    }
}

/// Execute a subcommand over an established session.
pub async fn run(client: &SecureClient, command: Command) -> anyhow::Result<()> {
    let api = client.api();
    let output = match command {
        Command::Handshake => {
            let session = client.session();
            json!({
                "session_id": session.session_id(),
                "server_key_fingerprint": session.server_public_key().fingerprint(),
                "cipher_suite": session.cipher().suite().as_str(),
            })
        }
        Command::Call {
            endpoint,
            method,
            data,
        } => {
            let method = parse_method(&method)?;
            let body = data
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("--data is not valid JSON")?;
            api.call(method, &endpoint, body.as_ref()).await?
        }
        Command::Stats => serde_json::to_value(api.license_stats().await?)?,
        Command::Products { page } => serde_json::to_value(api.list_products(page).await?)?,
        Command::AllProducts => serde_json::to_value(api.all_products().await?)?,
        Command::ProductStats { id } => serde_json::to_value(api.product_stats(id).await?)?,
        Command::DeleteProduct { id } => serde_json::to_value(api.delete_product(id).await?)?,
        Command::License { key } => serde_json::to_value(api.get_license(&key).await?)?,
        Command::Licenses(args) => {
            serde_json::to_value(api.list_licenses(&args.into()).await?)?
        }
        Command::Settings(args) => {
            serde_json::to_value(api.list_settings(&args.into()).await?)?
        }
        Command::Setting { product_id } => {
            serde_json::to_value(api.get_setting(product_id).await?)?
        }
        Command::DeleteSetting { product_id } => {
            serde_json::to_value(api.delete_setting(product_id).await?)?
        }
        Command::Users(args) => serde_json::to_value(api.list_users(&args.into()).await?)?,
        Command::Revoke { key } => serde_json::to_value(api.revoke_license(&key).await?)?,
        Command::DeleteLicense { key } => {
            serde_json::to_value(api.delete_license(&key).await?)?
        }
        Command::SetRole { username, role } => {
            serde_json::to_value(api.set_user_role(&username, &role).await?)?
        }
        Command::DeleteUser { username } => {
            serde_json::to_value(api.delete_user(&username).await?)?
        }
    };
    print_json(&output)
}

fn parse_method(raw: &str) -> anyhow::Result<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {raw:?}"))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
