// ABOUTME: PKCE (RFC 7636) verifier generation and S256 challenge verification
// ABOUTME: Only S256 is offered; the final challenge comparison is constant-time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use std::fmt::{self, Debug, Formatter};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use docaiche_auth_core::constants::pkce;
use docaiche_auth_core::{AuthError, AuthResult, ErrorCode};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A verifier/challenge pair bound to one authorization attempt
#[derive(Clone, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// Secret verifier, revealed only at code exchange
    pub verifier: String,
    /// `base64url(SHA256(verifier))`, unpadded
    pub challenge: String,
    /// Always `S256`
    pub method: String,
    /// Creation time, used for the independent max-age check
    pub created_at: DateTime<Utc>,
}

impl Debug for PkceChallenge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"***")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl PkceChallenge {
    /// Generate a fresh pair from 32 bytes of OS randomness
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; pkce::VERIFIER_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);

        Self {
            verifier,
            challenge,
            method: pkce::METHOD_S256.to_owned(),
            created_at: Utc::now(),
        }
    }

    /// Whether this challenge is older than `max_age`
    #[must_use]
    pub fn is_expired(&self, max_age: Duration) -> bool {
        Utc::now() - self.created_at > max_age
    }

    /// Verify a presented verifier against this challenge
    ///
    /// # Errors
    ///
    /// See [`verify`]
    pub fn verify_verifier(&self, verifier: &str) -> AuthResult<()> {
        verify(verifier, &self.challenge, &self.method)
    }
}

/// Compute the S256 challenge for a verifier
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check `verifier` against a stored `challenge`
///
/// # Errors
///
/// Returns `INVALID_PKCE_METHOD` for anything but `S256`, and
/// `PKCE_VERIFICATION_FAILED` when the verifier is malformed or does not hash
/// to the challenge
pub fn verify(verifier: &str, challenge: &str, method: &str) -> AuthResult<()> {
    if method != pkce::METHOD_S256 {
        return Err(AuthError::invalid_pkce_method(method));
    }
    if !is_well_formed_verifier(verifier) {
        return Err(AuthError::new(
            ErrorCode::PkceVerificationFailed,
            "code_verifier is not 43-128 unreserved characters",
        ));
    }

    let computed = challenge_for(verifier);
    if bool::from(computed.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::new(
            ErrorCode::PkceVerificationFailed,
            "code_verifier does not match code_challenge",
        ))
    }
}

fn is_well_formed_verifier(verifier: &str) -> bool {
    (pkce::VERIFIER_MIN_LEN..=pkce::VERIFIER_MAX_LEN).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_pair_verifies() {
        let pair = PkceChallenge::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.method, "S256");
        assert!(pair.verify_verifier(&pair.verifier).is_ok());
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_for(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_plain_method_rejected() {
        let pair = PkceChallenge::generate();
        let err = verify(&pair.verifier, &pair.verifier, "plain").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPkceMethod);
    }

    #[test]
    fn test_debug_hides_verifier() {
        let pair = PkceChallenge::generate();
        assert!(!format!("{pair:?}").contains(&pair.verifier));
    }

    #[test]
    fn test_expiry_is_independent_of_request() {
        let mut pair = PkceChallenge::generate();
        assert!(!pair.is_expired(Duration::seconds(600)));
        pair.created_at = Utc::now() - Duration::seconds(601);
        assert!(pair.is_expired(Duration::seconds(600)));
    }
}
