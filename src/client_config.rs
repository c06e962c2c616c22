//! Resolved OAuth client configuration and its process-wide cache.
//!
//! [`ClientConfig`] is built once: certificates are loaded and validated,
//! URLs parsed, defaults applied. [`ClientConfigCache`] guarantees a single
//! in-flight initialization and can be reset between tests.

use std::future::Future;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::tls::{CertificateBundle, CertificateLoader, CertificateOverrides, SecretStore};
use crate::{Error, Result};

/// Static OAuth client registration plus transport material.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Authorization server base URL
    pub server: Url,
    /// Registered client identifier
    pub client_id: String,
    /// Redirect URI registered with the authorization server
    pub redirect_uri: String,
    /// Requested scope
    pub scope: String,
    /// Always `code`
    pub response_type: String,
    /// Always `authorization_code`
    pub grant_type: String,
    /// Always `S256`
    pub code_challenge_method: String,
    /// Browser destination after login
    pub post_login_route: String,
    /// Browser destination after logout
    pub post_logout_route: String,
    /// Metering API
    pub protected_resource_url: Url,
    /// Client mTLS identity
    pub certificates: CertificateBundle,
    /// Disable server certificate validation (local testing only)
    pub skip_server_verification: bool,
}

/// Values a caller can force instead of configuration or loaded material.
#[derive(Debug, Clone, Default)]
pub struct ClientOverrides {
    /// Certificate material; key and bundle together bypass loading
    pub certificates: CertificateOverrides,
    /// Authorization server base URL
    pub server: Option<Url>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Redirect URI
    pub redirect_uri: Option<String>,
    /// Metering API
    pub protected_resource_url: Option<Url>,
    /// Server verification flag
    pub skip_server_verification: Option<bool>,
}

impl ClientConfig {
    /// Resolve configuration, load certificates, and validate the bundle.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a missing client id or bad URL, and
    /// `Error::Certificate` if no source yields a valid bundle.
    pub async fn initialize(
        config: &Config,
        overrides: ClientOverrides,
        store: Arc<dyn SecretStore>,
    ) -> Result<Self> {
        let client_id = overrides
            .client_id
            .clone()
            .unwrap_or_else(|| config.oauth.client_id.clone());
        if client_id.is_empty() {
            return Err(Error::Config(
                "oauth.client_id is required (CAP_OAUTH__CLIENT_ID or NEXT_PUBLIC_CLIENT_ID)"
                    .to_string(),
            ));
        }

        let server = match overrides.server {
            Some(url) => url,
            None => parse_url("oauth.server_url", &config.oauth.server_url)?,
        };
        let protected_resource_url = match overrides.protected_resource_url {
            Some(url) => url,
            None => parse_url("resource.url", &config.resource.url)?,
        };

        let app_env = config.app_env();
        let loader = CertificateLoader::for_environment(&app_env, &config.tls, store)
            .with_overrides(overrides.certificates);
        let certificates = loader.load().await?;

        let report = certificates.validate()?;
        info!(
            certificates = report.certificates,
            matching_index = report.matching_index,
            subject = %report.subject,
            "Client certificate bundle validated"
        );

        Ok(Self {
            server,
            client_id,
            redirect_uri: overrides
                .redirect_uri
                .unwrap_or_else(|| config.oauth.redirect_uri()),
            scope: config.oauth.scope.clone(),
            response_type: "code".to_string(),
            grant_type: "authorization_code".to_string(),
            code_challenge_method: "S256".to_string(),
            post_login_route: config.oauth.post_login_route(),
            post_logout_route: config.oauth.post_logout_route(),
            protected_resource_url,
            certificates,
            skip_server_verification: overrides
                .skip_server_verification
                .unwrap_or(config.tls.skip_server_verification),
        })
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("Invalid {key} '{value}': {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Compute-once holder for the resolved [`ClientConfig`].
///
/// A failed initialization leaves the cache empty so the next caller retries.
#[derive(Default)]
pub struct ClientConfigCache {
    cell: RwLock<Arc<OnceCell<Arc<ClientConfig>>>>,
}

impl ClientConfigCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached config, running `init` if none exists yet.
    /// Concurrent callers wait on the same initialization.
    ///
    /// # Errors
    ///
    /// Returns whatever `init` fails with.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<Arc<ClientConfig>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ClientConfig>>,
    {
        let cell = Arc::clone(&self.cell.read());
        cell.get_or_try_init(move || async move { init().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// The cached config, if initialized.
    pub fn get(&self) -> Option<Arc<ClientConfig>> {
        self.cell.read().get().cloned()
    }

    /// Drop the cached config.
    pub fn reset(&self) {
        *self.cell.write() = Arc::new(OnceCell::new());
    }
}

static GLOBAL_CACHE: LazyLock<ClientConfigCache> = LazyLock::new(ClientConfigCache::new);

/// Process-wide cache.
pub fn global_cache() -> &'static ClientConfigCache {
    &GLOBAL_CACHE
}
