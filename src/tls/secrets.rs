//! Remote secrets store access.
//!
//! The certificate secret is a JSON document holding `mtlsKey` and
//! `mtlsBundle` PEM strings. [`SecretStore`] abstracts the lookup so the
//! loader can be driven by an in-memory store in tests.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use super::bundle::CertificateBundle;
use crate::{Error, Result};

/// A named-secret lookup.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Fetch a secret's string value. `Ok(None)` when the secret has no
    /// string payload.
    async fn secret_string(&self, name: &str) -> Result<Option<String>>;
}

/// AWS Secrets Manager backed store.
///
/// The SDK client is created on first use so that environments which never
/// reach the secrets store do not resolve AWS credentials.
pub struct AwsSecretsManager {
    region: String,
    client: OnceCell<aws_sdk_secretsmanager::Client>,
}

impl AwsSecretsManager {
    /// Create a store for a region (e.g. `eu-west-2`).
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> &aws_sdk_secretsmanager::Client {
        self.client
            .get_or_init(|| async {
                let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()))
                    .load()
                    .await;
                aws_sdk_secretsmanager::Client::new(&sdk_config)
            })
            .await
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManager {
    async fn secret_string(&self, name: &str) -> Result<Option<String>> {
        debug!(secret = %name, region = %self.region, "Fetching secret");
        let output = self
            .client()
            .await
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| {
                Error::Certificate(format!(
                    "Failed to fetch secret '{name}': {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(output.secret_string().map(str::to_owned))
    }
}

/// Shape of the certificate secret.
#[derive(Deserialize)]
struct SecretPayload {
    #[serde(rename = "mtlsKey", default)]
    mtls_key: Option<String>,
    #[serde(rename = "mtlsBundle", default)]
    mtls_bundle: Option<String>,
}

/// Parse a certificate secret's JSON payload.
///
/// # Errors
///
/// Returns `Error::Certificate` when the payload is empty, not JSON, or
/// lacks `mtlsKey` / `mtlsBundle`.
pub fn parse_certificate_secret(payload: Option<&str>) -> Result<CertificateBundle> {
    let raw = payload.filter(|s| !s.trim().is_empty()).ok_or_else(|| {
        Error::Certificate("Secret is empty or not in the expected format.".to_string())
    })?;

    let parsed: SecretPayload = serde_json::from_str(raw).map_err(|e| {
        Error::Certificate(format!("Secret is empty or not in the expected format: {e}"))
    })?;

    let mtls_key = parsed
        .mtls_key
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Certificate("Secret missing mtlsKey".to_string()))?;
    let mtls_bundle = parsed
        .mtls_bundle
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Certificate("Secret missing mtlsBundle".to_string()))?;

    Ok(CertificateBundle::new(mtls_key, mtls_bundle))
}
