//! OAuth 2.0 client for the Perseus authorization server
//!
//! Implements the authorization code flow with PKCE (RFC 7636), pushed
//! authorization requests (RFC 9126) and mutual-TLS client authentication
//! (RFC 8705, `tls_client_auth`).
//!
//! Features:
//! - OAuth metadata discovery (RFC 8414), preferring `mtls_endpoint_aliases`
//! - PAR submission over mTLS
//! - Authorization code exchange
//! - RP-initiated logout URL

mod flow;
mod metadata;
mod pkce;

pub use flow::{AuthorizationFlow, TokenResponse, authorization_url, end_session_url};
pub use metadata::{DISCOVERY_PATH, IssuerMetadata, MtlsEndpointAliases};
pub use pkce::{PkcePair, challenge_for};
