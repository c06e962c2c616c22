//! Sender identity from an IB1 trust framework client certificate.
//!
//! The load balancer terminates mTLS and forwards the verified leaf as a
//! URL-encoded PEM in `X-Amzn-Mtls-Clientcert-Leaf`. Three facts identify
//! the sender:
//!
//! - **application**: first URI in the Subject Alternative Name
//! - **member**: extension `1.3.6.1.4.1.62329.1.3`, a DER `UTF8String`
//! - **roles**: extension `1.3.6.1.4.1.62329.1.1`, a DER `SEQUENCE OF UTF8String`

use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use serde::Serialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::der::parse_der;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

/// Header carrying the forwarded client certificate.
pub const CLIENT_CERT_HEADER: &str = "x-amzn-mtls-clientcert-leaf";

/// Roles extension OID.
pub const ROLE_OID: &str = "1.3.6.1.4.1.62329.1.1";

/// Member extension OID.
pub const MEMBER_OID: &str = "1.3.6.1.4.1.62329.1.3";

// ─────────────────────────────────────────────────────────────────────────────
// Sender identity
// ─────────────────────────────────────────────────────────────────────────────

/// Who sent an IB1 message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderIdentity {
    /// Application URL (SAN URI).
    pub application: String,
    /// Member URL.
    pub member: String,
    /// Scheme roles.
    pub roles: Vec<String>,
}

impl SenderIdentity {
    /// Decode from the raw header value (URL-encoded PEM).
    ///
    /// # Errors
    ///
    /// Returns `Error::Certificate` if the value is not a certificate or
    /// lacks any of the identity fields.
    pub fn from_header(value: &str) -> Result<Self> {
        let pem = urlencoding::decode(value)
            .map_err(|e| Error::Certificate(format!("Client certificate header is not valid UTF-8: {e}")))?;
        Self::from_pem(&pem)
    }

    /// Decode from PEM text.
    ///
    /// # Errors
    ///
    /// See [`SenderIdentity::from_header`].
    pub fn from_pem(pem: &str) -> Result<Self> {
        let der = CertificateDer::from_pem_slice(pem.as_bytes())
            .map_err(|e| Error::Certificate(format!("Failed to parse client certificate: {e}")))?;
        Self::from_der(der.as_ref())
    }

    /// Decode from a DER certificate.
    ///
    /// # Errors
    ///
    /// See [`SenderIdentity::from_header`].
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("Failed to parse client certificate: {e}")))?;

        Ok(Self {
            application: decode_application(&cert)?,
            member: decode_member(&cert)?,
            roles: decode_roles(&cert)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction helpers
// ─────────────────────────────────────────────────────────────────────────────

fn decode_application(cert: &X509Certificate<'_>) -> Result<String> {
    let missing =
        || Error::Certificate("Client certificate does not include application information".to_string());

    let san = cert.subject_alternative_name().ok().flatten().ok_or_else(missing)?;
    san.value
        .general_names
        .iter()
        .find_map(|name| match name {
            GeneralName::URI(uri) => Some((*uri).to_owned()),
            _ => None,
        })
        .ok_or_else(missing)
}

fn decode_member(cert: &X509Certificate<'_>) -> Result<String> {
    let value = extension_value(cert, MEMBER_OID).ok_or_else(|| {
        Error::Certificate("Client certificate does not include member information".to_string())
    })?;
    let invalid = || Error::Certificate("Failed to decode member extension DER value".to_string());

    let (_, obj) = parse_der(value).map_err(|_| invalid())?;
    obj.as_str().map(str::to_owned).map_err(|_| invalid())
}

fn decode_roles(cert: &X509Certificate<'_>) -> Result<Vec<String>> {
    let value = extension_value(cert, ROLE_OID).ok_or_else(|| {
        Error::Certificate("Client certificate does not include role information".to_string())
    })?;
    let invalid = || Error::Certificate("Failed to decode roles extension DER value".to_string());

    let (_, obj) = parse_der(value).map_err(|_| invalid())?;
    obj.as_sequence()
        .map_err(|_| invalid())?
        .iter()
        .map(|item| item.as_str().map(str::to_owned).map_err(|_| invalid()))
        .collect()
}

/// Raw `extnValue` contents of the extension with `oid`.
fn extension_value<'a>(cert: &'a X509Certificate<'_>, oid: &str) -> Option<&'a [u8]> {
    cert.extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == oid)
        .map(|ext| ext.value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
