//! mTLS HTTP client factory.
//!
//! Each call builds one pooled [`reqwest::Client`]; callers keep it and
//! reuse it for every request. No request timeout is configured.

use reqwest::{Certificate, Client, Identity};
use tracing::{debug, warn};

use super::bundle::CertificateBundle;
use crate::{Error, Result};

/// Build a client that presents the bundle's key and chain on every TLS
/// handshake.
///
/// # Errors
///
/// Returns `Error::Certificate` if the identity or CA bundle cannot be
/// parsed, or `Error::Http` if the client cannot be built.
pub fn build_mtls_client(bundle: &CertificateBundle, skip_server_verification: bool) -> Result<Client> {
    let identity = Identity::from_pem(&bundle.identity_pem())
        .map_err(|e| Error::Certificate(format!("Invalid client identity: {e}")))?;

    debug!(
        key_len = bundle.mtls_key.len(),
        bundle_len = bundle.mtls_bundle.len(),
        skip_server_verification,
        "Building mTLS client"
    );

    let builder = Client::builder().identity(identity);
    let builder = trust(builder, bundle.ca_bundle.as_deref(), skip_server_verification)?;
    Ok(builder.build()?)
}

/// Build a client without a client identity, sharing the trust settings.
/// Used for metadata discovery.
///
/// # Errors
///
/// Returns an error if the CA bundle cannot be parsed or the client cannot
/// be built.
pub fn build_plain_client(ca_bundle: Option<&str>, skip_server_verification: bool) -> Result<Client> {
    let builder = trust(Client::builder(), ca_bundle, skip_server_verification)?;
    Ok(builder.build()?)
}

fn trust(
    mut builder: reqwest::ClientBuilder,
    ca_bundle: Option<&str>,
    skip_server_verification: bool,
) -> Result<reqwest::ClientBuilder> {
    if let Some(ca) = ca_bundle {
        let roots = Certificate::from_pem_bundle(ca.as_bytes())
            .map_err(|e| Error::Certificate(format!("Invalid CA bundle: {e}")))?;
        debug!(roots = roots.len(), "Adding trusted roots");
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
    }

    if skip_server_verification {
        warn!("Server certificate verification is DISABLED; use for local testing only");
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}
