//! Perseus Consumer Access Provider
//!
//! OAuth 2.0 client for the Perseus energy-data trust framework: the
//! authorization code flow with PKCE and pushed authorization requests, with
//! every call to the authorization and resource servers authenticated by a
//! client certificate (`tls_client_auth`).
//!
//! # Features
//!
//! - **Certificates**: local PEM files or a secrets store entry, validated
//!   key-against-chain before use
//! - **OAuth**: RFC 8414 discovery with mTLS endpoint aliases, PAR, code exchange
//! - **Sessions**: encrypted private cookie
//! - **Resource proxy**: meter listing and readings from the metering API
//! - **IB1 messages**: sender identity from forwarded client certificates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client_config;
pub mod config;
pub mod error;
pub mod oauth;
pub mod resource;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;
pub mod tls;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to initialize tracing: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to initialize tracing: {e}"))),
    }
}
