//! PKCE (RFC 7636) verifier and S256 challenge.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// One-time verifier/challenge pair for a single authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret kept in the session until token exchange
    pub code_verifier: String,
    /// `base64url(SHA-256(code_verifier))`, sent with the PAR
    pub code_challenge: String,
}

impl PkcePair {
    /// Generate from 32 bytes of CSPRNG output
    #[must_use]
    pub fn generate() -> Self {
        let verifier_bytes: [u8; 32] = rand::random();
        let code_verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let code_challenge = challenge_for(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

/// S256 challenge for a verifier
#[must_use]
pub fn challenge_for(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_43_base64url_chars() {
        let pair = PkcePair::generate();
        assert_eq!(pair.code_verifier.len(), 43);
        assert!(
            pair.code_verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn challenge_is_sha256_of_verifier() {
        let pair = PkcePair::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pair.code_verifier.as_bytes()));
        assert_eq!(pair.code_challenge, expected);
        assert_ne!(pair.code_verifier, pair.code_challenge);
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn pairs_are_unique() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.code_challenge, b.code_challenge);
    }
}
