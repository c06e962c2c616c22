//! Shared application state

use std::sync::Arc;

use axum::extract::FromRef;
use tracing::info;

use crate::Result;
use crate::client_config::ClientConfig;
use crate::config::Config;
use crate::oauth::AuthorizationFlow;
use crate::resource::ResourceProxy;
use crate::session::SessionSettings;
use crate::tls::{build_mtls_client, build_plain_client};

/// Read-only state shared by every request
pub struct AppState {
    /// Resolved client registration
    pub client: Arc<ClientConfig>,
    /// OAuth flow over the pooled clients
    pub flow: AuthorizationFlow,
    /// Metering API proxy (mTLS)
    pub resource: ResourceProxy,
    /// Session cookie settings
    pub session: SessionSettings,
    /// Redirect to the IdP end-session endpoint on logout
    pub idp_logout: bool,
}

impl AppState {
    /// Build the HTTP clients and session settings for a resolved client.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity or CA bundle is rejected by the TLS
    /// stack, or the session password is too short.
    pub fn new(config: &Config, client: Arc<ClientConfig>) -> Result<Self> {
        let skip = client.skip_server_verification;
        let mtls = build_mtls_client(&client.certificates, skip)?;
        let discovery = build_plain_client(client.certificates.ca_bundle.as_deref(), skip)?;
        let session = SessionSettings::from_config(&config.session)?;

        info!(
            server = %client.server,
            client_id = %client.client_id,
            resource = %client.protected_resource_url,
            idp_logout = config.oauth.idp_logout,
            "Application state ready"
        );

        Ok(Self {
            flow: AuthorizationFlow::new(Arc::clone(&client), mtls.clone(), discovery),
            resource: ResourceProxy::new(
                mtls,
                client.protected_resource_url.clone(),
                config.resource.from.clone(),
                config.resource.to.clone(),
            ),
            session,
            idp_logout: config.oauth.idp_logout,
            client,
        })
    }
}

impl FromRef<Arc<AppState>> for SessionSettings {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.session.clone()
    }
}
