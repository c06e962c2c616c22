//! OAuth Metadata Discovery
//!
//! Implements RFC 8414 (OAuth Authorization Server Metadata) with the
//! RFC 8705 `mtls_endpoint_aliases` preference: when the server advertises
//! mTLS aliases, token and PAR requests go to the alias.

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// Well-known path, resolved against the server origin
pub const DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerMetadata {
    /// Authorization server issuer URL
    #[serde(default)]
    pub issuer: String,

    /// Authorization endpoint URL
    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint URL
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// Pushed authorization request endpoint (RFC 9126)
    #[serde(default)]
    pub pushed_authorization_request_endpoint: Option<String>,

    /// RP-initiated logout endpoint
    #[serde(default)]
    pub end_session_endpoint: Option<String>,

    /// Endpoints to use when authenticating with a client certificate (RFC 8705)
    #[serde(default)]
    pub mtls_endpoint_aliases: Option<MtlsEndpointAliases>,

    /// Supported scopes (may be string or array due to implementation bugs)
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes_supported: Vec<String>,

    /// Supported token endpoint auth methods
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// Supported PKCE code challenge methods
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// mTLS endpoint aliases (RFC 8705 section 5)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtlsEndpointAliases {
    /// Token endpoint alias
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// PAR endpoint alias
    #[serde(default)]
    pub pushed_authorization_request_endpoint: Option<String>,
}

/// Deserialize scopes that may be either a string or array
fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        StringOrVec::Vec(v) => Ok(v),
    }
}

impl IssuerMetadata {
    /// Discover authorization server metadata for a server
    ///
    /// # Errors
    ///
    /// Returns `Error::Discovery` if the metadata endpoint is unreachable,
    /// answers with a non-success status, or returns invalid JSON.
    pub async fn discover(client: &Client, server: &Url) -> Result<Self> {
        let url = server.join(DISCOVERY_PATH)?;
        debug!(url = %url, "Discovering OAuth authorization server metadata");

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("Failed to fetch OAuth metadata: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "OAuth metadata discovery failed: HTTP {}",
                response.status()
            )));
        }

        let metadata: Self = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("Failed to parse OAuth metadata: {e}")))?;

        debug!(
            issuer = %metadata.issuer,
            mtls_aliases = metadata.mtls_endpoint_aliases.is_some(),
            "Discovered authorization server"
        );
        Ok(metadata)
    }

    /// Token endpoint, preferring the mTLS alias
    pub fn token_endpoint(&self) -> Option<&str> {
        self.mtls_endpoint_aliases
            .as_ref()
            .and_then(|a| a.token_endpoint.as_deref())
            .or(self.token_endpoint.as_deref())
    }

    /// PAR endpoint, preferring the mTLS alias
    pub fn par_endpoint(&self) -> Option<&str> {
        self.mtls_endpoint_aliases
            .as_ref()
            .and_then(|a| a.pushed_authorization_request_endpoint.as_deref())
            .or(self.pushed_authorization_request_endpoint.as_deref())
    }

    /// Token endpoint or a discovery error
    pub fn require_token_endpoint(&self) -> Result<&str> {
        self.token_endpoint().ok_or_else(|| {
            Error::Discovery("Token endpoint not found in server metadata".to_string())
        })
    }

    /// PAR endpoint or a discovery error
    pub fn require_par_endpoint(&self) -> Result<&str> {
        self.par_endpoint()
            .ok_or_else(|| Error::Discovery("PAR endpoint not found in server metadata".to_string()))
    }

    /// Authorization endpoint or a discovery error
    pub fn require_authorization_endpoint(&self) -> Result<&str> {
        self.authorization_endpoint.as_deref().ok_or_else(|| {
            Error::Discovery("Authorization endpoint not found in server metadata".to_string())
        })
    }

    /// Check if PKCE is supported (S256 method)
    #[must_use]
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .any(|m| m == "S256")
    }
}
