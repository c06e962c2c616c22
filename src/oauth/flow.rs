//! Authorization code flow: PAR initiation, code exchange, logout URL.
//!
//! Discovery uses the plain client; PAR and token requests authenticate with
//! the client certificate (`tls_client_auth`), so they go through the mTLS
//! client.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::metadata::IssuerMetadata;
use super::pkce::PkcePair;
use crate::client_config::ClientConfig;
use crate::session::Session;
use crate::{Error, Result};

/// PAR response (RFC 9126 section 2.2)
#[derive(Debug, Deserialize)]
struct ParResponse {
    request_uri: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for the resource server
    #[serde(default)]
    pub access_token: String,
    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token, when `offline_access` was granted
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth client for one registered client configuration
#[derive(Clone)]
pub struct AuthorizationFlow {
    config: Arc<ClientConfig>,
    mtls: Client,
    discovery: Client,
}

impl AuthorizationFlow {
    /// Create a flow over pre-built clients
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, mtls: Client, discovery: Client) -> Self {
        Self {
            config,
            mtls,
            discovery,
        }
    }

    /// Client configuration in use
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch the issuer metadata. Not cached; every call hits the server.
    pub async fn discover(&self) -> Result<IssuerMetadata> {
        IssuerMetadata::discover(&self.discovery, &self.config.server).await
    }

    /// Start a login: store a fresh PKCE verifier in the session, push the
    /// authorization request, and return the URL to redirect the browser to.
    ///
    /// # Errors
    ///
    /// Returns `Error::Discovery` for unreachable or incomplete metadata and
    /// `Error::Upstream` for a rejected PAR.
    pub async fn initiate(&self, session: &mut Session) -> Result<Url> {
        let metadata = self.discover().await?;
        let pkce = PkcePair::generate();

        session.code_verifier = Some(pkce.code_verifier.clone());
        session.save()?;

        let request_uri = self.push_authorization_request(&metadata, &pkce).await?;
        authorization_url(&metadata, &self.config.client_id, &request_uri)
    }

    /// POST the authorization parameters to the PAR endpoint
    async fn push_authorization_request(
        &self,
        metadata: &IssuerMetadata,
        pkce: &PkcePair,
    ) -> Result<String> {
        let endpoint = metadata.require_par_endpoint()?;
        let config = &self.config;

        let params = [
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_type", config.response_type.as_str()),
            ("scope", config.scope.as_str()),
            ("code_challenge", pkce.code_challenge.as_str()),
            ("code_challenge_method", config.code_challenge_method.as_str()),
        ];

        debug!(endpoint, "Pushing authorization request");
        let response = self.mtls.post(endpoint).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(Error::upstream("PAR request failed", response).await);
        }

        let par: ParResponse = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("Failed to parse PAR response: {e}")))?;
        let request_uri = par
            .request_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| Error::Discovery("PAR response missing request_uri".to_string()))?;

        debug!(expires_in = ?par.expires_in, "PAR accepted");
        Ok(request_uri)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns `Error::Discovery` if no token endpoint is advertised,
    /// `Error::Upstream` with the status and body for a rejected exchange, and
    /// `Error::Session` if the response carries no access token.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        let metadata = self.discover().await?;
        let endpoint = metadata.require_token_endpoint()?;
        let config = &self.config;

        let params = [
            ("grant_type", config.grant_type.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        debug!(endpoint, "Exchanging authorization code");
        let response = self.mtls.post(endpoint).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(Error::upstream("Token request failed", response).await);
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(Error::Session("Access token missing from token response".to_string()));
        }

        info!(
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            expires_in = ?token.expires_in,
            has_refresh_token = token.refresh_token.is_some(),
            "Token exchange succeeded"
        );
        Ok(token)
    }

    /// IdP logout URL, when the server advertises an end-session endpoint
    pub async fn end_session_url(&self) -> Result<Option<Url>> {
        let metadata = self.discover().await?;
        end_session_url(
            &metadata,
            &self.config.client_id,
            &self.config.post_logout_route,
        )
    }
}

/// Authorization endpoint with `client_id` and `request_uri`
pub fn authorization_url(metadata: &IssuerMetadata, client_id: &str, request_uri: &str) -> Result<Url> {
    let mut url = Url::parse(metadata.require_authorization_endpoint()?)?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("request_uri", request_uri);
    Ok(url)
}

/// End-session endpoint with `client_id` and `post_logout_redirect_uri`
pub fn end_session_url(
    metadata: &IssuerMetadata,
    client_id: &str,
    post_logout_redirect_uri: &str,
) -> Result<Option<Url>> {
    let Some(endpoint) = metadata.end_session_endpoint.as_deref() else {
        return Ok(None);
    };
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
    Ok(Some(url))
}
