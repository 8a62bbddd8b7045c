// ABOUTME: JWKS key cache resolving RS256 verification keys from the authorization server's JWK Set
// ABOUTME: Refetches on staleness or unknown kid; the lock is held only around the cache swap
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! JWKS key cache
//!
//! Keys are reconstructed from the JWK modulus and exponent. Anything other
//! than an RSA signing key fails closed with `UNSUPPORTED_KEY_TYPE` or
//! `UNSUPPORTED_ALGORITHM`.
//!
//! An unknown `kid` refetches the set at most once per
//! `min_refetch_interval`, so tokens naming bogus keys cannot drive traffic
//! to the JWKS endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use docaiche_auth_core::{AuthError, AuthResult, ErrorCode};
use jsonwebtoken::DecodingKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::remote::{AuthorizationServer, RemoteError};

/// Smallest RSA modulus accepted for signature verification
const MIN_RSA_BITS: usize = 2048;

/// Largest RSA modulus accepted
const MAX_RSA_BITS: usize = 8192;

/// JWK (RFC 7517) as published by the authorization server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type
    pub kty: String,
    /// Public key use
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl JsonWebKey {
    /// JWK for an RSA public key
    #[must_use]
    pub fn from_rsa_public_key(kid: &str, public_key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".to_owned(),
            key_use: Some("sig".to_owned()),
            kid: Some(kid.to_owned()),
            alg: Some("RS256".to_owned()),
            n: Some(URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be())),
            e: Some(URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be())),
        }
    }

    /// Build an RS256 decoding key from the modulus and exponent
    ///
    /// # Errors
    ///
    /// `UNSUPPORTED_KEY_TYPE` for non-RSA keys, encryption keys, missing or
    /// undecodable components and moduli under 2048 bits;
    /// `UNSUPPORTED_ALGORITHM` for an `alg` other than RS256
    pub fn decoding_key(&self) -> AuthResult<DecodingKey> {
        if self.kty != "RSA" {
            return Err(unsupported_key(format!("key type '{}' is not supported", self.kty)));
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(unsupported_key("key is not a signing key"));
        }
        if let Some(alg) = self.alg.as_deref().filter(|alg| *alg != "RS256") {
            return Err(AuthError::new(
                ErrorCode::UnsupportedAlgorithm,
                format!("key algorithm '{alg}' is not supported"),
            ));
        }

        let n = decode_component(self.n.as_deref(), "n")?;
        let e = decode_component(self.e.as_deref(), "e")?;
        let public_key = RsaPublicKey::new_with_max_size(
            BigUint::from_bytes_be(&n),
            BigUint::from_bytes_be(&e),
            MAX_RSA_BITS,
        )
        .map_err(|err| unsupported_key(format!("invalid RSA key material: {err}")))?;
        if public_key.size() * 8 < MIN_RSA_BITS {
            return Err(unsupported_key(format!(
                "RSA modulus of {} bits is below {MIN_RSA_BITS}",
                public_key.size() * 8
            )));
        }

        Ok(DecodingKey::from_rsa_raw_components(&n, &e))
    }
}

fn decode_component(value: Option<&str>, name: &str) -> AuthResult<Vec<u8>> {
    let value = value.ok_or_else(|| unsupported_key(format!("RSA key is missing '{name}'")))?;
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| unsupported_key(format!("RSA component '{name}' is not base64url: {e}")))
}

fn unsupported_key(message: impl Into<String>) -> AuthError {
    AuthError::new(ErrorCode::UnsupportedKeyType, message)
}

/// JWK Set container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Published keys
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// Find a key by id; without an id a set holding exactly one key matches it
    #[must_use]
    pub fn find(&self, key_id: Option<&str>) -> Option<&JsonWebKey> {
        match key_id {
            Some(kid) => self.keys.iter().find(|key| key.kid.as_deref() == Some(kid)),
            None if self.keys.len() == 1 => self.keys.first(),
            None => None,
        }
    }
}

/// The cached key set and when it was fetched
#[derive(Debug, Clone)]
pub struct JwksCacheEntry {
    /// Keys from the last successful fetch
    pub keys: JsonWebKeySet,
    /// Fetch time
    pub fetched_at: Instant,
}

/// Process-scoped cache of the authorization server's signing keys
pub struct JwksCache {
    server: Arc<dyn AuthorizationServer>,
    ttl: Duration,
    fetch_timeout: Duration,
    min_refetch_interval: Duration,
    entry: RwLock<Option<JwksCacheEntry>>,
}

enum Lookup {
    Hit(JsonWebKey),
    /// Unknown id, but the set was fetched too recently to try again
    Throttled,
    Refetch,
}

impl JwksCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(server: Arc<dyn AuthorizationServer>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            server,
            ttl,
            fetch_timeout,
            min_refetch_interval: Duration::ZERO,
            entry: RwLock::new(None),
        }
    }

    /// Skip unknown-kid refetches while the cached set is younger than `interval`
    ///
    /// Stale sets are always refetched.
    #[must_use]
    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Resolve the decoding key for `key_id`
    ///
    /// Served from cache while fresh. A stale cache or an unknown id triggers
    /// one refetch of the full set before giving up.
    ///
    /// # Errors
    ///
    /// `JWKS_FETCH_FAILED` when the set cannot be fetched, `KEY_NOT_FOUND`
    /// when the id is absent after a refresh, and key conversion errors
    pub async fn get_key(&self, key_id: Option<&str>) -> AuthResult<DecodingKey> {
        match self.lookup(key_id).await {
            Lookup::Hit(key) => return key.decoding_key(),
            Lookup::Throttled => return Err(key_not_found(key_id)),
            Lookup::Refetch => {}
        }

        let keys = self.refresh().await?;
        keys.find(key_id).map_or_else(
            || {
                warn!(kid = ?key_id, "Signing key not found after JWKS refresh");
                Err(key_not_found(key_id))
            },
            JsonWebKey::decoding_key,
        )
    }

    async fn lookup(&self, key_id: Option<&str>) -> Lookup {
        let guard = self.entry.read().await;
        let Some(entry) = guard.as_ref() else {
            return Lookup::Refetch;
        };
        let age = entry.fetched_at.elapsed();
        if age >= self.ttl {
            debug!("JWKS cache is stale");
            return Lookup::Refetch;
        }
        match entry.keys.find(key_id) {
            Some(key) => Lookup::Hit(key.clone()),
            None if age < self.min_refetch_interval => {
                debug!(kid = ?key_id, "Unknown kid within refetch interval");
                Lookup::Throttled
            }
            None => Lookup::Refetch,
        }
    }

    /// Fetch the key set and swap it into the cache
    ///
    /// # Errors
    ///
    /// Returns `JWKS_FETCH_FAILED` on timeout or remote failure
    pub async fn refresh(&self) -> AuthResult<JsonWebKeySet> {
        // fetch outside the lock; concurrent refreshes may duplicate the request
        let keys = match tokio::time::timeout(self.fetch_timeout, self.server.fetch_key_set()).await
        {
            Ok(Ok(keys)) => keys,
            Ok(Err(e)) => return Err(fetch_failed(e)),
            Err(_) => return Err(fetch_failed(RemoteError::Timeout(self.fetch_timeout))),
        };

        info!(key_count = keys.keys.len(), "JWKS refreshed");
        *self.entry.write().await = Some(JwksCacheEntry {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    /// Key ids currently cached
    pub async fn cached_key_ids(&self) -> Vec<String> {
        self.entry.read().await.as_ref().map_or_else(Vec::new, |entry| {
            entry.keys.keys.iter().filter_map(|key| key.kid.clone()).collect()
        })
    }

    /// Drop the cached set
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

fn key_not_found(key_id: Option<&str>) -> AuthError {
    AuthError::new(
        ErrorCode::KeyNotFound,
        format!("no signing key with kid {key_id:?}"),
    )
}

fn fetch_failed(error: RemoteError) -> AuthError {
    warn!(error = %error, "JWKS fetch failed");
    AuthError::new(ErrorCode::JwksFetchFailed, "unable to fetch signing keys").with_source(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_rsa_key_fails_closed() {
        let key = JsonWebKey {
            kty: "EC".to_owned(),
            key_use: Some("sig".to_owned()),
            kid: Some("ec-1".to_owned()),
            alg: Some("ES256".to_owned()),
            n: None,
            e: None,
        };
        let err = key.decoding_key().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedKeyType);
    }

    #[test]
    fn test_wrong_algorithm_rejected() {
        let key = JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: None,
            kid: None,
            alg: Some("RS512".to_owned()),
            n: Some("AQAB".to_owned()),
            e: Some("AQAB".to_owned()),
        };
        assert_eq!(
            key.decoding_key().unwrap_err().code,
            ErrorCode::UnsupportedAlgorithm
        );
    }

    #[test]
    fn test_short_modulus_rejected() {
        let key = JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: Some("sig".to_owned()),
            kid: Some("tiny".to_owned()),
            alg: None,
            n: Some(URL_SAFE_NO_PAD.encode([0xC5_u8; 64])),
            e: Some("AQAB".to_owned()),
        };
        assert_eq!(
            key.decoding_key().unwrap_err().code,
            ErrorCode::UnsupportedKeyType
        );
    }

    #[test]
    fn test_find_without_kid_requires_single_key() {
        let key = JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: None,
            kid: Some("a".to_owned()),
            alg: None,
            n: None,
            e: None,
        };
        let single = JsonWebKeySet {
            keys: vec![key.clone()],
        };
        assert!(single.find(None).is_some());
        let double = JsonWebKeySet {
            keys: vec![key.clone(), key],
        };
        assert!(double.find(None).is_none());
        assert!(double.find(Some("a")).is_some());
    }
}
