//! Configuration management

use std::{env, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default authorization server
pub const DEFAULT_SERVER_URL: &str = "https://preprod.perseus-demo-authentication.ib1.org";

/// Default protected resource (metering API) origin
pub const DEFAULT_RESOURCE_URL: &str = "https://preprod.perseus-demo-energy.ib1.org";

/// Default scope requested at the pushed authorization request
pub const DEFAULT_SCOPE: &str = "https://registry.core.sandbox.trust.ib1.org/scheme/perseus/license/energy-consumption-data/2024-12-05+offline_access";

/// Environment variables honoured for compatibility with existing deployments,
/// mapped onto their configuration keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("NEXT_PUBLIC_SERVER_URL", "oauth.server_url"),
    ("NEXT_PUBLIC_CLIENT_ID", "oauth.client_id"),
    ("NEXT_PUBLIC_APP_URL", "oauth.app_url"),
    ("NEXT_PUBLIC_REDIRECT_URL", "oauth.post_login_route"),
    ("NEXT_PUBLIC_PROTECTED_RESOURCE_URL", "resource.url"),
    ("MTLS_KEY_PATH", "tls.key_path"),
    ("MTLS_BUNDLE_PATH", "tls.bundle_path"),
    ("SECRET_COOKIE_PASSWORD", "session.password"),
];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before the environment is read.
    /// Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Deployment environment (`local`, `dev`, `preprod`, ...).
    /// Falls back to `APP_ENV`, then `ENVIRONMENT`, then `local`.
    pub app_env: Option<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// OAuth client registration
    pub oauth: OAuthConfig,
    /// Protected resource (metering API)
    pub resource: ResourceConfig,
    /// Client certificate material
    pub tls: TlsConfig,
    /// Session cookie
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// OAuth client registration and flow routes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization server base URL (discovery is relative to its origin)
    pub server_url: String,
    /// Registered client identifier
    pub client_id: String,
    /// Public URL of this application
    pub app_url: String,
    /// Redirect URI registered with the authorization server.
    /// Defaults to `{app_url}/auth/callback`.
    pub redirect_uri: Option<String>,
    /// Requested scope
    pub scope: String,
    /// Where the browser lands after a successful login. Defaults to `app_url`.
    pub post_login_route: Option<String>,
    /// Where the browser lands after logout. Defaults to the post-login route.
    pub post_logout_route: Option<String>,
    /// Redirect to the authorization server's end-session endpoint on logout
    pub idp_logout: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            client_id: String::new(),
            app_url: "http://localhost:3000".to_string(),
            redirect_uri: None,
            scope: DEFAULT_SCOPE.to_string(),
            post_login_route: None,
            post_logout_route: None,
            idp_logout: false,
        }
    }
}

impl OAuthConfig {
    /// Effective redirect URI
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/auth/callback", self.app_url.trim_end_matches('/')))
    }

    /// Effective post-login route
    #[must_use]
    pub fn post_login_route(&self) -> String {
        self.post_login_route
            .clone()
            .unwrap_or_else(|| self.app_url.clone())
    }

    /// Effective post-logout route
    #[must_use]
    pub fn post_logout_route(&self) -> String {
        self.post_logout_route
            .clone()
            .unwrap_or_else(|| self.post_login_route())
    }
}

/// Protected resource configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Metering API URL; only its origin is used
    pub url: String,
    /// Start of the fixed reading window
    pub from: String,
    /// End of the fixed reading window
    pub to: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RESOURCE_URL.to_string(),
            from: "2024-12-05".to_string(),
            to: "2024-12-06".to_string(),
        }
    }
}

/// Client certificate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Private key PEM path (local mode)
    pub key_path: String,
    /// Certificate chain PEM path (local mode)
    pub bundle_path: String,
    /// Extra trusted roots for the authorization and resource servers
    pub ca_path: Option<String>,
    /// Disable server certificate validation. Local testing only.
    pub skip_server_verification: bool,
    /// Secrets store entry. Defaults to `{app_env}/perseus-demo-cap/mtls-key-bundle`.
    pub secret_name: Option<String>,
    /// Secrets store region
    pub region: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            key_path: "./certs/cap-demo-certs/cap-demo-key.pem".to_string(),
            bundle_path: "./certs/cap-demo-certs/cap-demo-bundle.pem".to_string(),
            ca_path: None,
            skip_server_verification: false,
            secret_name: None,
            region: "eu-west-2".to_string(),
        }
    }
}

impl TlsConfig {
    /// Effective secrets store entry for an environment
    #[must_use]
    pub fn secret_name(&self, app_env: &str) -> String {
        self.secret_name
            .clone()
            .unwrap_or_else(|| format!("{app_env}/perseus-demo-cap/mtls-key-bundle"))
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie encryption password (at least 32 characters)
    pub password: Option<String>,
    /// Mark the cookie `Secure`. Forced on when `NODE_ENV=production`.
    pub secure: bool,
    /// Cookie name
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            password: None,
            secure: false,
            cookie_name: "cap_session".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
        }

        // Env files have to land in the process environment before the
        // environment providers read it.
        let env_files: Vec<String> = Self::figment(path)
            .extract_inner("env_files")
            .unwrap_or_default();
        load_env_files(&env_files);

        let mut config = Self::from_figment(&Self::figment(path))?;

        if env::var("NODE_ENV").is_ok_and(|v| v == "production") {
            config.session.secure = true;
        }

        Ok(config)
    }

    /// Layered providers: YAML file, legacy variables, then `CAP_` variables
    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();

        if let Some(p) = path {
            figment = figment.merge(Yaml::file(p));
        }

        let legacy: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
        figment = figment.merge(
            Env::raw()
                .only(&legacy)
                .map(|key| legacy_key(key.as_str()).unwrap_or_default().into()),
        );

        figment.merge(Env::prefixed("CAP_").split("__"))
    }

    /// Extract a configuration from a prepared figment
    ///
    /// # Errors
    ///
    /// Returns an error if the merged values do not deserialize.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolved deployment environment
    #[must_use]
    pub fn app_env(&self) -> String {
        let app_env = self.app_env.clone().or_else(|| env::var("APP_ENV").ok());
        resolve_app_env(app_env.as_deref(), env::var("ENVIRONMENT").ok().as_deref())
    }
}

/// Configuration key for a legacy environment variable
fn legacy_key(name: &str) -> Option<&'static str> {
    LEGACY_ENV
        .iter()
        .find(|(legacy, _)| legacy.eq_ignore_ascii_case(name))
        .map(|(_, key)| *key)
}

/// Pick the deployment environment, defaulting to `local`
pub fn resolve_app_env(app_env: Option<&str>, environment: Option<&str>) -> String {
    match app_env.or(environment).filter(|v| !v.is_empty()) {
        Some(value) => {
            tracing::debug!(app_env = value, "Resolved application environment");
            value.to_string()
        }
        None => {
            tracing::warn!("APP_ENV environment variable is missing; defaulting to \"local\"");
            "local".to_string()
        }
    }
}

/// Load environment files into the process environment.
/// Files that don't exist are skipped.
fn load_env_files(paths: &[String]) {
    for path_str in paths {
        let path = Path::new(path_str);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {path_str}"),
                Err(e) => tracing::warn!("Failed to load env file {path_str}: {e}"),
            }
        } else {
            tracing::debug!("Env file not found (skipped): {path_str}");
        }
    }
}
