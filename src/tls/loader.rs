//! Certificate loading strategy.
//!
//! Sources are tried in rank order, stopping at the first success:
//!
//! | Environment      | Order                            |
//! |------------------|----------------------------------|
//! | `local` / `dev`  | local files, then secrets store  |
//! | anything else    | secrets store                    |
//!
//! Caller overrides carrying both key and bundle bypass every source.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::bundle::CertificateBundle;
use super::secrets::{SecretStore, parse_certificate_secret};
use crate::config::TlsConfig;
use crate::{Error, Result};

/// One place certificate material can come from.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Load the key and chain.
    async fn load(&self) -> Result<CertificateBundle>;
}

/// Caller-supplied certificate material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateOverrides {
    /// Private key PEM.
    pub mtls_key: Option<String>,
    /// Certificate chain PEM.
    pub mtls_bundle: Option<String>,
    /// Extra trusted roots.
    pub ca_bundle: Option<String>,
}

impl CertificateOverrides {
    /// A complete bundle when both key and chain are present.
    fn complete(&self) -> Option<CertificateBundle> {
        match (&self.mtls_key, &self.mtls_bundle) {
            (Some(key), Some(bundle)) if !key.is_empty() && !bundle.is_empty() => Some(
                CertificateBundle::new(key.clone(), bundle.clone())
                    .with_ca_bundle(self.ca_bundle.clone()),
            ),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Key and chain read from the local filesystem.
pub struct LocalFileSource {
    key_path: String,
    bundle_path: String,
}

impl LocalFileSource {
    /// Read from the given PEM paths.
    pub fn new(key_path: impl Into<String>, bundle_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            bundle_path: bundle_path.into(),
        }
    }
}

#[async_trait]
impl CertificateSource for LocalFileSource {
    fn name(&self) -> &'static str {
        "local files"
    }

    async fn load(&self) -> Result<CertificateBundle> {
        debug!(key = %self.key_path, bundle = %self.bundle_path, "Loading certificates from files");
        let mtls_key = read_pem(&self.key_path).await?;
        let mtls_bundle = read_pem(&self.bundle_path).await?;
        debug!(
            key_len = mtls_key.len(),
            bundle_len = mtls_bundle.len(),
            "Read certificate files"
        );
        Ok(CertificateBundle::new(mtls_key, mtls_bundle))
    }
}

/// Key and chain held in a named secret.
pub struct SecretStoreSource {
    store: Arc<dyn SecretStore>,
    secret_name: String,
}

impl SecretStoreSource {
    /// Read the named secret from `store`.
    pub fn new(store: Arc<dyn SecretStore>, secret_name: impl Into<String>) -> Self {
        Self {
            store,
            secret_name: secret_name.into(),
        }
    }
}

#[async_trait]
impl CertificateSource for SecretStoreSource {
    fn name(&self) -> &'static str {
        "secrets store"
    }

    async fn load(&self) -> Result<CertificateBundle> {
        info!(secret = %self.secret_name, "Loading certificates from secrets store");
        let payload = self.store.secret_string(&self.secret_name).await?;
        parse_certificate_secret(payload.as_deref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Ranked certificate sources plus overrides.
pub struct CertificateLoader {
    sources: Vec<Box<dyn CertificateSource>>,
    overrides: CertificateOverrides,
    ca_path: Option<String>,
}

impl CertificateLoader {
    /// Loader over an explicit source list.
    pub fn new(sources: Vec<Box<dyn CertificateSource>>) -> Self {
        Self {
            sources,
            overrides: CertificateOverrides::default(),
            ca_path: None,
        }
    }

    /// Source order for a deployment environment.
    pub fn for_environment(app_env: &str, tls: &TlsConfig, store: Arc<dyn SecretStore>) -> Self {
        let secrets: Box<dyn CertificateSource> =
            Box::new(SecretStoreSource::new(store, tls.secret_name(app_env)));

        let sources = if is_local_env(app_env) {
            vec![
                Box::new(LocalFileSource::new(&tls.key_path, &tls.bundle_path))
                    as Box<dyn CertificateSource>,
                secrets,
            ]
        } else {
            info!(app_env, "Non-local environment; loading certificates from secrets store");
            vec![secrets]
        };

        Self::new(sources).with_ca_path(tls.ca_path.clone())
    }

    /// Caller overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: CertificateOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// CA bundle file attached to whatever a source returns.
    #[must_use]
    pub fn with_ca_path(mut self, ca_path: Option<String>) -> Self {
        self.ca_path = ca_path;
        self
    }

    /// Names of the sources in try order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Resolve the bundle.
    ///
    /// # Errors
    ///
    /// Returns the last source's error when every source fails, or a
    /// `Certificate` error when no source is configured.
    pub async fn load(&self) -> Result<CertificateBundle> {
        if let Some(bundle) = self.overrides.complete() {
            debug!("Using certificate overrides");
            return Ok(bundle);
        }

        let mut last_error = None;
        for source in &self.sources {
            match source.load().await {
                Ok(bundle) => {
                    info!(source = source.name(), "Loaded client certificates");
                    return self.attach_ca(bundle).await;
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Certificate source failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Certificate("No certificate source configured".to_string())
        }))
    }

    async fn attach_ca(&self, bundle: CertificateBundle) -> Result<CertificateBundle> {
        if bundle.ca_bundle.is_some() {
            return Ok(bundle);
        }
        if let Some(ca) = &self.overrides.ca_bundle {
            return Ok(bundle.with_ca_bundle(Some(ca.clone())));
        }
        match &self.ca_path {
            Some(path) => {
                let ca = read_pem(path).await?;
                Ok(bundle.with_ca_bundle(Some(ca)))
            }
            None => Ok(bundle),
        }
    }
}

/// Environments that prefer local certificate files.
pub fn is_local_env(app_env: &str) -> bool {
    matches!(app_env, "local" | "dev")
}

async fn read_pem(path: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Certificate(format!("Cannot read '{path}': {e}")))
}
