//! sealdash secure session client
//!
//! Negotiates an encrypted session with the dashboard API server and carries
//! every dashboard call through it:
//!
//! - [`SessionNegotiator`]: `/init-session` then `/key-exchange`, published
//!   through a [`SessionHandle`]
//! - [`EncryptedTransport`]: envelope wrap/unwrap with desynchronization
//!   detection
//! - [`DashboardApi`]: typed endpoints
//! - [`SecureClient`]: all of the above from a [`sealdash_core::Config`]

pub mod api;
pub mod client;
pub mod error;
mod http;
pub mod negotiator;
pub mod session;
pub mod transport;

pub use api::{DashboardApi, ListQuery};
pub use client::SecureClient;
pub use error::{ClientError, Result};
pub use http::{CLIENT_ID_HEADER, SESSION_ID_HEADER};
pub use negotiator::SessionNegotiator;
pub use reqwest::Method;
pub use session::{Session, SessionHandle, SessionState};
pub use transport::{ENCRYPTED_DATA_FIELD, EncryptedTransport};
