//! Client certificate bundle: PEM material and key/chain validation.
//!
//! The bundle holds PEM text exactly as loaded (file or secret). Parsing
//! happens on demand so the original text can be handed to the HTTP client
//! unchanged.

use std::fmt;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Bundle
// ─────────────────────────────────────────────────────────────────────────────

/// Client mTLS identity as PEM text.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// Private key PEM.
    pub mtls_key: String,
    /// Certificate chain PEM (leaf first, then intermediates).
    pub mtls_bundle: String,
    /// Extra trusted roots for the servers we call.
    pub ca_bundle: Option<String>,
}

// Key material never reaches logs.
impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("mtls_key", &format_args!("<{} bytes>", self.mtls_key.len()))
            .field("mtls_bundle", &format_args!("<{} bytes>", self.mtls_bundle.len()))
            .field("ca_bundle", &self.ca_bundle.as_ref().map(String::len))
            .finish()
    }
}

/// Outcome of [`CertificateBundle::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleReport {
    /// Number of certificates in the chain.
    pub certificates: usize,
    /// Index of the certificate whose public key matches the private key.
    pub matching_index: usize,
    /// Subject DN of the matching certificate.
    pub subject: String,
}

impl CertificateBundle {
    /// Create a bundle from key and chain PEM text.
    pub fn new(mtls_key: impl Into<String>, mtls_bundle: impl Into<String>) -> Self {
        Self {
            mtls_key: mtls_key.into(),
            mtls_bundle: mtls_bundle.into(),
            ca_bundle: None,
        }
    }

    /// Attach extra trusted roots.
    #[must_use]
    pub fn with_ca_bundle(mut self, ca_bundle: Option<String>) -> Self {
        self.ca_bundle = ca_bundle;
        self
    }

    /// PEM handed to the HTTP client as its identity: key followed by the chain.
    pub fn identity_pem(&self) -> Vec<u8> {
        let mut pem = Vec::with_capacity(self.mtls_key.len() + self.mtls_bundle.len() + 1);
        pem.extend_from_slice(self.mtls_key.trim_end().as_bytes());
        pem.push(b'\n');
        pem.extend_from_slice(self.mtls_bundle.as_bytes());
        pem
    }

    /// Parse every certificate in the chain.
    ///
    /// # Errors
    ///
    /// Returns `Error::Certificate` if a PEM block is malformed or the chain
    /// holds no certificate.
    pub fn certificates(&self) -> Result<Vec<CertificateDer<'static>>> {
        let certs = CertificateDer::pem_slice_iter(self.mtls_bundle.as_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Certificate(format!("Failed to parse certificate bundle: {e}")))?;

        if certs.is_empty() {
            return Err(Error::Certificate(
                "No certificates found in bundle".to_string(),
            ));
        }

        Ok(certs)
    }

    /// Parse the private key.
    ///
    /// Supports PKCS#8 (`PRIVATE KEY`), RSA and SEC1 EC keys.
    ///
    /// # Errors
    ///
    /// Returns `Error::Certificate` if no private key can be parsed.
    pub fn private_key(&self) -> Result<PrivateKeyDer<'static>> {
        PrivateKeyDer::from_pem_slice(self.mtls_key.as_bytes())
            .map_err(|e| Error::Certificate(format!("Failed to parse private key: {e}")))
    }

    /// Check that the key parses and that one certificate in the chain
    /// carries its public key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Certificate` on unparseable material or when no
    /// certificate matches the key.
    pub fn validate(&self) -> Result<BundleReport> {
        let certs = self.certificates()?;
        let key_public = self.key_public_bits()?;

        for (index, der) in certs.iter().enumerate() {
            let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|e| {
                Error::Certificate(format!("Failed to parse certificate {index} in bundle: {e}"))
            })?;

            if cert.public_key().subject_public_key.data.as_ref() == key_public.as_slice() {
                return Ok(BundleReport {
                    certificates: certs.len(),
                    matching_index: index,
                    subject: cert.subject().to_string(),
                });
            }
        }

        Err(Error::Certificate(format!(
            "Private key does not match any of the {} certificate(s) in the bundle",
            certs.len()
        )))
    }

    /// Raw public key bits derived from the private key.
    fn key_public_bits(&self) -> Result<Vec<u8>> {
        let key = self.private_key()?;
        let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key)
            .map_err(|e| Error::Certificate(format!("Unsupported private key: {e}")))?;
        let spki = signing_key.public_key().ok_or_else(|| {
            Error::Certificate("Cannot derive public key from private key".to_string())
        })?;
        let (_, info) = SubjectPublicKeyInfo::from_der(spki.as_ref())
            .map_err(|e| Error::Certificate(format!("Malformed public key: {e}")))?;
        Ok(info.subject_public_key.data.to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
