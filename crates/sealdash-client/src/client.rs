//! One-call setup: negotiate a session and expose the dashboard API over it.

use std::sync::Arc;

use sealdash_core::Config;
use tracing::info;

use crate::api::DashboardApi;
use crate::error::Result;
use crate::negotiator::SessionNegotiator;
use crate::session::Session;
use crate::transport::EncryptedTransport;

/// A connected client with an established session.
#[derive(Debug)]
pub struct SecureClient {
    config: Config,
    session: Arc<Session>,
    api: DashboardApi,
}

impl SecureClient {
    /// Negotiate a session with the configured server.
    pub async fn connect(config: Config) -> Result<Self> {
        let (session, api) = Self::establish(&config).await?;
        Ok(Self {
            config,
            session,
            api,
        })
    }

    async fn establish(config: &Config) -> Result<(Arc<Session>, DashboardApi)> {
        let mut negotiator = SessionNegotiator::new(config)?;
        let transport = negotiator.transport();
        let session = negotiator.negotiate().await?;
        Ok((session, DashboardApi::new(transport)))
    }

    /// Replace the session with a freshly negotiated one.
    ///
    /// On failure the previous session stays in place.
    pub async fn renegotiate(&mut self) -> Result<()> {
        let previous = self.session.session_id().to_string();
        let (session, api) = Self::establish(&self.config).await?;
        info!(
            previous = %previous,
            session_id = %session.session_id(),
            "Session renegotiated"
        );
        self.session = session;
        self.api = api;
        Ok(())
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub const fn api(&self) -> &DashboardApi {
        &self.api
    }

    pub const fn transport(&self) -> &EncryptedTransport {
        self.api.transport()
    }
}
