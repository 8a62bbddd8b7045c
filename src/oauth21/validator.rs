// ABOUTME: JWT access-token validation: revocation short-circuit, signature, standard claims, scope and resource
// ABOUTME: RS256 via the JWKS cache in production; HS256 shared secret only behind the dev-hs256 feature
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! Token validation pipeline
//!
//! 1. Revoked tokens are rejected before any cryptographic work.
//! 2. The header is parsed for `kid` and `alg`, which only select a key.
//! 3. The signature is verified with the mode fixed at construction.
//! 4. `exp`, `nbf`, issuer and audience are checked.
//! 5. Scope and resource requirements are matched against the claims.
//! 6. Optional remote introspection; an inactive verdict is remembered.

use std::sync::Arc;
use std::time::Duration;

use docaiche_auth_core::constants::token_hints;
use docaiche_auth_core::{AuthError, AuthResult, ErrorCode};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::jwks::JwksCache;
use super::remote::AuthorizationServer;
use super::revocation::RevocationCache;
use crate::utils::short_fingerprint;

/// A claim that may be a single string or an array of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    /// Single value
    One(String),
    /// Several values
    Many(Vec<String>),
}

impl OneOrMany {
    /// Values as a slice-like list
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Whether `value` is present
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(one) => one == value,
            Self::Many(many) => many.iter().any(|v| v == value),
        }
    }
}

/// Claims this subsystem reads from an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<OneOrMany>,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Token id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Space-separated scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// RFC 8707 resources the token is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
}

impl AccessTokenClaims {
    /// Granted scopes
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map_or_else(Vec::new, |scope| scope.split_whitespace().collect())
    }

    /// Whether `scope` was granted
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }

    /// Resources the token is bound to: the `resource` claim, else `aud`
    #[must_use]
    pub fn resources(&self) -> Vec<&str> {
        self.resource
            .as_ref()
            .or(self.aud.as_ref())
            .map_or_else(Vec::new, OneOrMany::values)
    }
}

/// How signatures are verified, fixed at construction
pub enum ValidationMode {
    /// RS256 with keys from the authorization server's JWK Set
    Jwks(Arc<JwksCache>),
    /// HS256 with a shared secret, for local development only
    #[cfg(feature = "dev-hs256")]
    SharedSecret(DecodingKey),
}

impl ValidationMode {
    /// Development-mode HS256 from a shared secret
    #[cfg(feature = "dev-hs256")]
    #[must_use]
    pub fn shared_secret(secret: &str) -> Self {
        warn!("Token validation uses an HS256 shared secret (development mode)");
        Self::SharedSecret(DecodingKey::from_secret(secret.as_bytes()))
    }

    const fn algorithm(&self) -> Algorithm {
        match self {
            Self::Jwks(_) => Algorithm::RS256,
            #[cfg(feature = "dev-hs256")]
            Self::SharedSecret(_) => Algorithm::HS256,
        }
    }

    async fn key_for(&self, kid: Option<&str>) -> AuthResult<DecodingKey> {
        match self {
            Self::Jwks(cache) => cache.get_key(kid).await,
            #[cfg(feature = "dev-hs256")]
            Self::SharedSecret(key) => Ok(key.clone()),
        }
    }
}

struct IntrospectionPolicy {
    server: Arc<dyn AuthorizationServer>,
    fail_open: bool,
    timeout: Duration,
}

/// Validates access tokens presented to protected operations
pub struct TokenValidator {
    mode: ValidationMode,
    revocations: Arc<RevocationCache>,
    issuer: Option<String>,
    default_audiences: Vec<String>,
    leeway_secs: u64,
    introspection: Option<IntrospectionPolicy>,
}

impl TokenValidator {
    /// Create a validator with no issuer, audience or introspection checks
    #[must_use]
    pub fn new(mode: ValidationMode, revocations: Arc<RevocationCache>) -> Self {
        Self {
            mode,
            revocations,
            issuer: None,
            default_audiences: Vec::new(),
            leeway_secs: 0,
            introspection: None,
        }
    }

    /// Require this `iss`
    #[must_use]
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Audiences accepted when a call names no required resource
    #[must_use]
    pub fn with_default_audiences(mut self, audiences: Vec<String>) -> Self {
        self.default_audiences = audiences;
        self
    }

    /// Clock skew tolerated on `exp` and `nbf`
    #[must_use]
    pub const fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Consult remote introspection after local checks pass
    #[must_use]
    pub fn with_introspection(
        mut self,
        server: Arc<dyn AuthorizationServer>,
        fail_open: bool,
        timeout: Duration,
    ) -> Self {
        self.introspection = Some(IntrospectionPolicy {
            server,
            fail_open,
            timeout,
        });
        self
    }

    /// The revocation cache consulted first
    #[must_use]
    pub fn revocations(&self) -> &Arc<RevocationCache> {
        &self.revocations
    }

    /// Verify signature and standard claims
    ///
    /// `audiences` is the accepted `aud` set; when empty the configured
    /// default audiences apply, and when both are empty `aud` is not checked.
    ///
    /// # Errors
    ///
    /// `TOKEN_REVOKED`, `MALFORMED_TOKEN`, `UNSUPPORTED_ALGORITHM`, key
    /// resolution errors, `TOKEN_EXPIRED`, `INVALID_SIGNATURE`,
    /// `INVALID_AUDIENCE`, `INVALID_ISSUER` or `MISSING_CLAIM`
    pub async fn decode(&self, token: &str, audiences: &[String]) -> AuthResult<AccessTokenClaims> {
        if self.revocations.is_revoked(token) {
            return Err(AuthError::new(ErrorCode::TokenRevoked, "token has been revoked"));
        }

        let header = decode_header(token).map_err(|e| {
            AuthError::new(ErrorCode::MalformedToken, "token header is not a valid JWT header")
                .with_source(e)
        })?;
        let algorithm = self.mode.algorithm();
        if header.alg != algorithm {
            return Err(AuthError::new(
                ErrorCode::UnsupportedAlgorithm,
                format!("token algorithm {:?} is not accepted, expected {algorithm:?}", header.alg),
            ));
        }

        let key = self.mode.key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        let mut required_claims = vec!["exp"];
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
            required_claims.push("iss");
        }
        let audiences = if audiences.is_empty() {
            self.default_audiences.as_slice()
        } else {
            audiences
        };
        if audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(audiences);
            required_claims.push("aud");
        }
        validation.set_required_spec_claims(&required_claims);

        decode::<AccessTokenClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    /// Full validation returning the claims
    ///
    /// # Errors
    ///
    /// Every [`TokenValidator::decode`] error, `INSUFFICIENT_SCOPE`,
    /// `INVALID_AUDIENCE` when a required resource is not bound to the token,
    /// `TOKEN_INACTIVE` when introspection says so, and `REMOTE_UNAVAILABLE`
    /// when introspection fails closed
    pub async fn check(
        &self,
        token: &str,
        required_scope: Option<&str>,
        required_resources: &[String],
    ) -> AuthResult<AccessTokenClaims> {
        let claims = self.decode(token, required_resources).await?;

        if let Some(scope) = required_scope {
            if !claims.has_scope(scope) {
                return Err(AuthError::insufficient_scope(
                    &required_resources.join(" "),
                    &[scope.to_owned()],
                ));
            }
        }

        let bound = claims.resources();
        if let Some(missing) = required_resources
            .iter()
            .find(|resource| !bound.contains(&resource.as_str()))
        {
            return Err(AuthError::new(
                ErrorCode::InvalidAudience,
                format!("token is not bound to resource {missing}"),
            ));
        }

        self.introspect(token).await?;
        Ok(claims)
    }

    /// Coarse boolean form of [`TokenValidator::check`]
    pub async fn validate(
        &self,
        token: &str,
        required_scope: Option<&str>,
        required_resources: &[String],
    ) -> bool {
        match self.check(token, required_scope, required_resources).await {
            Ok(_) => true,
            Err(e) => {
                debug!(
                    token = %short_fingerprint(token),
                    code = %e.code,
                    "Token rejected"
                );
                false
            }
        }
    }

    async fn introspect(&self, token: &str) -> AuthResult<()> {
        let Some(policy) = &self.introspection else {
            return Ok(());
        };

        let outcome = tokio::time::timeout(
            policy.timeout,
            policy.server.introspect(token, Some(token_hints::ACCESS_TOKEN)),
        )
        .await;

        match outcome {
            Ok(Ok(response)) if response.active => Ok(()),
            Ok(Ok(_)) => {
                // remember the verdict so later calls stop before crypto
                self.revocations.revoke(token);
                Err(AuthError::new(
                    ErrorCode::TokenInactive,
                    "introspection reports the token inactive",
                ))
            }
            Ok(Err(e)) => self.introspection_unavailable(policy, token, &e.to_string()),
            Err(_) => self.introspection_unavailable(policy, token, "timed out"),
        }
    }

    #[allow(clippy::unused_self)]
    fn introspection_unavailable(
        &self,
        policy: &IntrospectionPolicy,
        token: &str,
        reason: &str,
    ) -> AuthResult<()> {
        if policy.fail_open {
            warn!(
                token = %short_fingerprint(token),
                reason,
                "Introspection unavailable; treating token as active"
            );
            Ok(())
        } else {
            Err(AuthError::new(
                ErrorCode::RemoteUnavailable,
                format!("introspection unavailable: {reason}"),
            ))
        }
    }
}

fn map_jwt_error(error: jsonwebtoken::errors::Error) -> AuthError {
    let (code, message) = match error.kind() {
        ErrorKind::ExpiredSignature => (ErrorCode::TokenExpired, "token has expired".to_owned()),
        ErrorKind::ImmatureSignature => {
            (ErrorCode::TokenInactive, "token is not valid yet".to_owned())
        }
        ErrorKind::InvalidSignature => {
            (ErrorCode::InvalidSignature, "signature verification failed".to_owned())
        }
        ErrorKind::InvalidAudience => {
            (ErrorCode::InvalidAudience, "token audience does not match".to_owned())
        }
        ErrorKind::InvalidIssuer => {
            (ErrorCode::InvalidIssuer, "token issuer does not match".to_owned())
        }
        ErrorKind::MissingRequiredClaim(claim) => {
            (ErrorCode::MissingClaim, format!("token is missing the '{claim}' claim"))
        }
        ErrorKind::InvalidAlgorithm => {
            (ErrorCode::UnsupportedAlgorithm, "token algorithm is not accepted".to_owned())
        }
        _ => (ErrorCode::MalformedToken, "token could not be decoded".to_owned()),
    };
    AuthError::new(code, message).with_source(error)
}
