//! Encrypted cookie session.
//!
//! The whole [`SessionData`] is serialized to JSON and stored in a single
//! private (authenticated and encrypted) cookie. Handlers take a [`Session`]
//! extractor, mutate it through `Deref`, and call [`Session::save`]; the
//! cookie manager layer writes `Set-Cookie` on the way out.

use std::ops::{Deref, DerefMut};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::StatusCode;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies, Key};
use tracing::debug;

use crate::config::SessionConfig;
use crate::{Error, Result};

/// Minimum accepted cookie password length
pub const MIN_PASSWORD_LEN: usize = 32;

/// Per-browser state carried in the cookie
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Set after a successful token exchange
    #[serde(rename = "isLoggedIn", default)]
    pub is_logged_in: bool,
    /// Bearer token for the resource server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// PKCE verifier, present between login and callback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Optional OAuth `state`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Tenant the user belongs to
    #[serde(rename = "tenantId", default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl SessionData {
    /// Drop login state and any pending verifier
    pub fn clear_auth(&mut self) {
        self.is_logged_in = false;
        self.access_token = None;
        self.code_verifier = None;
    }
}

/// Cookie key and attributes, shared by every request
#[derive(Clone)]
pub struct SessionSettings {
    key: Key,
    cookie_name: String,
    secure: bool,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("cookie_name", &self.cookie_name)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionSettings {
    /// Derive the cookie key from the configured password.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the password is missing or shorter than
    /// [`MIN_PASSWORD_LEN`] characters.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let password = config.password.as_deref().unwrap_or_default();
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::Config(format!(
                "session.password must be at least {MIN_PASSWORD_LEN} characters \
                 (CAP_SESSION__PASSWORD or SECRET_COOKIE_PASSWORD)"
            )));
        }

        let digest = Sha512::digest(password.as_bytes());
        let key = Key::try_from(digest.as_slice())
            .map_err(|e| Error::Config(format!("Invalid session key: {e}")))?;

        Ok(Self {
            key,
            cookie_name: config.cookie_name.clone(),
            secure: config.secure,
        })
    }

    /// Name of the session cookie
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

/// Request-scoped session, loaded from the private cookie
pub struct Session {
    cookies: Cookies,
    settings: SessionSettings,
    data: SessionData,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    SessionSettings: FromRef<S>,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state).await?;
        let settings = SessionSettings::from_ref(state);

        // Missing, tampered and stale cookies all start a fresh session.
        let data = cookies
            .private(&settings.key)
            .get(&settings.cookie_name)
            .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
            .unwrap_or_default();

        Ok(Self {
            cookies,
            settings,
            data,
        })
    }
}

impl Session {
    /// Write the current data back to the cookie jar.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the data cannot be serialized.
    pub fn save(&self) -> Result<()> {
        let value = serde_json::to_string(&self.data)?;
        let cookie = Cookie::build((self.settings.cookie_name.clone(), value))
            .http_only(true)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.settings.secure)
            .build();

        self.cookies.private(&self.settings.key).add(cookie);
        debug!(
            logged_in = self.data.is_logged_in,
            has_token = self.data.access_token.is_some(),
            has_verifier = self.data.code_verifier.is_some(),
            "Session saved"
        );
        Ok(())
    }

    /// Clear login state and save. Returns whether an access token was
    /// present beforehand.
    ///
    /// # Errors
    ///
    /// See [`Session::save`].
    pub fn logout(&mut self) -> Result<bool> {
        let had_token = self.data.access_token.is_some();
        self.data.clear_auth();
        self.save()?;
        Ok(had_token)
    }

    /// Snapshot of the current data
    #[must_use]
    pub fn data(&self) -> &SessionData {
        &self.data
    }
}

impl Deref for Session {
    type Target = SessionData;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
