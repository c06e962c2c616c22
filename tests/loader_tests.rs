//! Certificate loading and client configuration tests

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{MemoryStore, self_signed};
use perseus_cap::Error;
use perseus_cap::client_config::{ClientConfig, ClientOverrides};
use perseus_cap::config::{Config, TlsConfig};
use perseus_cap::tls::{CertificateLoader, CertificateOverrides};

const SECRET: &str = "local/perseus-demo-cap/mtls-key-bundle";

fn tls_config(dir: &std::path::Path) -> TlsConfig {
    TlsConfig {
        key_path: dir.join("key.pem").display().to_string(),
        bundle_path: dir.join("bundle.pem").display().to_string(),
        ..TlsConfig::default()
    }
}

fn secret_json(key: &str, bundle: &str) -> String {
    json!({ "mtlsKey": key, "mtlsBundle": bundle }).to_string()
}

// =============================================================================
// Overrides
// =============================================================================

#[tokio::test]
async fn complete_overrides_bypass_every_source() {
    // GIVEN: no files and a store that would be consulted
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let overrides = CertificateOverrides {
        mtls_key: Some("OVERRIDE KEY".to_string()),
        mtls_bundle: Some("OVERRIDE CHAIN".to_string()),
        ca_bundle: None,
    };

    // WHEN: loading with key and bundle overrides
    let bundle = CertificateLoader::for_environment("local", &tls_config(dir.path()), store.clone())
        .with_overrides(overrides)
        .load()
        .await
        .unwrap();

    // THEN: the overrides come back unchanged, nothing else is touched
    assert_eq!(bundle.mtls_key, "OVERRIDE KEY");
    assert_eq!(bundle.mtls_bundle, "OVERRIDE CHAIN");
    assert_eq!(store.lookups(), 0);
}

// =============================================================================
// Source order
// =============================================================================

#[tokio::test]
async fn local_environment_reads_files_first() {
    let dir = tempfile::tempdir().unwrap();
    let (key, cert) = self_signed("cap.local");
    std::fs::write(dir.path().join("key.pem"), &key).unwrap();
    std::fs::write(dir.path().join("bundle.pem"), &cert).unwrap();
    let store = Arc::new(MemoryStore::default());

    let loader = CertificateLoader::for_environment("local", &tls_config(dir.path()), store.clone());
    assert_eq!(loader.source_names(), vec!["local files", "secrets store"]);

    let bundle = loader.load().await.unwrap();
    assert_eq!(bundle.mtls_key, key);
    assert_eq!(bundle.mtls_bundle, cert);
    assert_eq!(store.lookups(), 0);
    assert!(bundle.validate().is_ok());
}

#[tokio::test]
async fn local_environment_falls_back_to_secrets_store() {
    let dir = tempfile::tempdir().unwrap();
    let (key, cert) = self_signed("cap.local");
    let store = Arc::new(MemoryStore::with_secret(SECRET, &secret_json(&key, &cert)));

    let bundle = CertificateLoader::for_environment("local", &tls_config(dir.path()), store.clone())
        .load()
        .await
        .unwrap();

    assert_eq!(bundle.mtls_key, key);
    assert_eq!(store.lookups(), 1);
}

#[tokio::test]
async fn deployed_environment_uses_secrets_store_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("key.pem"), "FILE KEY").unwrap();
    std::fs::write(dir.path().join("bundle.pem"), "FILE CHAIN").unwrap();
    let store = Arc::new(MemoryStore::with_secret(
        "preprod/perseus-demo-cap/mtls-key-bundle",
        &secret_json("SECRET KEY", "SECRET CHAIN"),
    ));

    let loader = CertificateLoader::for_environment("preprod", &tls_config(dir.path()), store);
    assert_eq!(loader.source_names(), vec!["secrets store"]);

    let bundle = loader.load().await.unwrap();
    assert_eq!(bundle.mtls_key, "SECRET KEY");
}

#[tokio::test]
async fn malformed_secret_surfaces_certificate_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::with_secret(
        "preprod/perseus-demo-cap/mtls-key-bundle",
        r#"{"mtlsKey": "KEY"}"#,
    ));

    let err = CertificateLoader::for_environment("preprod", &tls_config(dir.path()), store)
        .load()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Certificate(_)));
    assert_eq!(err.to_string(), "Secret missing mtlsBundle");
}

#[tokio::test]
async fn ca_file_is_attached_to_loaded_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let (key, cert) = self_signed("cap.local");
    let (_, ca) = self_signed("ca.local");
    std::fs::write(dir.path().join("key.pem"), &key).unwrap();
    std::fs::write(dir.path().join("bundle.pem"), &cert).unwrap();
    std::fs::write(dir.path().join("ca.pem"), &ca).unwrap();

    let mut tls = tls_config(dir.path());
    tls.ca_path = Some(dir.path().join("ca.pem").display().to_string());

    let bundle = CertificateLoader::for_environment("dev", &tls, Arc::new(MemoryStore::default()))
        .load()
        .await
        .unwrap();
    assert_eq!(bundle.ca_bundle.as_deref(), Some(ca.as_str()));
}

// =============================================================================
// ClientConfig::initialize
// =============================================================================

fn config() -> Config {
    let mut config = Config::default();
    config.oauth.client_id = "https://directory.example.org/a/test-client".to_string();
    config
}

#[tokio::test]
async fn initialize_rejects_mismatched_key() {
    let (key, _) = self_signed("one.local");
    let (_, other_cert) = self_signed("two.local");
    let overrides = ClientOverrides {
        certificates: CertificateOverrides {
            mtls_key: Some(key),
            mtls_bundle: Some(other_cert),
            ca_bundle: None,
        },
        ..ClientOverrides::default()
    };

    let err = ClientConfig::initialize(&config(), overrides, Arc::new(MemoryStore::default()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Certificate(_)));
    assert!(err.to_string().contains("does not match"));
}

#[tokio::test]
async fn initialize_requires_client_id() {
    let err = ClientConfig::initialize(
        &Config::default(),
        ClientOverrides::default(),
        Arc::new(MemoryStore::default()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn initialize_applies_fixed_flow_parameters() {
    let (key, cert) = self_signed("cap.local");
    let overrides = ClientOverrides {
        certificates: CertificateOverrides {
            mtls_key: Some(key),
            mtls_bundle: Some(cert),
            ca_bundle: None,
        },
        ..ClientOverrides::default()
    };

    let client = ClientConfig::initialize(&config(), overrides, Arc::new(MemoryStore::default()))
        .await
        .unwrap();

    assert_eq!(client.response_type, "code");
    assert_eq!(client.grant_type, "authorization_code");
    assert_eq!(client.code_challenge_method, "S256");
    assert_eq!(client.redirect_uri, "http://localhost:3000/auth/callback");
    assert!(!client.skip_server_verification);
}
