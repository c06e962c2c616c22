//! Client certificates: loading, validation, and the mTLS HTTP client.
//!
//! # Architecture
//!
//! ```text
//! CertificateLoader
//!   → overrides (key + bundle)?  return as-is
//!   → local files / secrets store, in rank order
//!   → CertificateBundle::validate()  (key matches a cert in the chain)
//!   → build_mtls_client()            (one pooled reqwest::Client)
//! ```
//!
//! # Modules
//!
//! - [`bundle`]: PEM material and key/chain matching (`CertificateBundle`)
//! - [`loader`]: ranked certificate sources (`CertificateLoader`)
//! - [`secrets`]: secrets store access (`SecretStore`, `AwsSecretsManager`)
//! - [`client`]: mTLS and plain HTTP client construction
//! - [`ib1_cert`]: sender identity from forwarded IB1 client certificates

pub mod bundle;
pub mod client;
pub mod ib1_cert;
pub mod loader;
pub mod secrets;

pub use bundle::{BundleReport, CertificateBundle};
pub use client::{build_mtls_client, build_plain_client};
pub use ib1_cert::{CLIENT_CERT_HEADER, SenderIdentity};
pub use loader::{
    CertificateLoader, CertificateOverrides, CertificateSource, LocalFileSource,
    SecretStoreSource, is_local_env,
};
pub use secrets::{AwsSecretsManager, SecretStore, parse_certificate_secret};
