// ABOUTME: Integration tests for the JWKS signing key cache
// ABOUTME: Caching, refetch on unknown kid, rotation, staleness and fetch failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{key_set, other_key, signing_key, MockAuthorizationServer, KID, ROTATED_KID};
use docaiche_auth::oauth21::{JsonWebKey, JsonWebKeySet, JwksCache};
use docaiche_auth::ErrorCode;

fn cache(server: &Arc<MockAuthorizationServer>, ttl: Duration) -> JwksCache {
    JwksCache::new(server.clone(), ttl, Duration::from_secs(2))
}

#[tokio::test]
async fn test_fresh_cache_serves_without_refetch() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::from_secs(3600));

    cache.get_key(Some(KID)).await.unwrap();
    cache.get_key(Some(KID)).await.unwrap();
    cache.get_key(Some(KID)).await.unwrap();

    assert_eq!(server.jwks_fetch_count(), 1);
    assert_eq!(cache.cached_key_ids().await, vec![KID.to_owned()]);
}

#[tokio::test]
async fn test_unknown_kid_refetches_then_fails() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::from_secs(3600));
    cache.get_key(Some(KID)).await.unwrap();

    let err = cache.get_key(Some("retired-key")).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::KeyNotFound);
    assert_eq!(server.jwks_fetch_count(), 2);
}

#[tokio::test]
async fn test_rotated_key_is_picked_up() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::from_secs(3600));
    cache.get_key(Some(KID)).await.unwrap();

    server.set_keys(key_set(&[(KID, signing_key()), (ROTATED_KID, other_key())]));
    cache.get_key(Some(ROTATED_KID)).await.unwrap();

    assert_eq!(server.jwks_fetch_count(), 2);
    let mut ids = cache.cached_key_ids().await;
    ids.sort();
    assert_eq!(ids, vec![KID.to_owned(), ROTATED_KID.to_owned()]);
}

#[tokio::test]
async fn test_unknown_kid_refetch_is_rate_limited() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::from_secs(3600))
        .with_min_refetch_interval(Duration::from_secs(3600));
    cache.get_key(Some(KID)).await.unwrap();

    for _ in 0..20 {
        let err = cache.get_key(Some("bogus-kid")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::KeyNotFound);
    }
    assert_eq!(server.jwks_fetch_count(), 1);

    server.set_keys(key_set(&[(KID, signing_key()), (ROTATED_KID, other_key())]));
    assert!(cache.get_key(Some(ROTATED_KID)).await.is_err());
    cache.get_key(Some(KID)).await.unwrap();
    assert_eq!(server.jwks_fetch_count(), 1);

    cache.invalidate().await;
    cache.get_key(Some(ROTATED_KID)).await.unwrap();
    assert_eq!(server.jwks_fetch_count(), 2);
}

#[tokio::test]
async fn test_rate_limit_does_not_block_stale_refetch() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::ZERO)
        .with_min_refetch_interval(Duration::from_secs(3600));
    cache.get_key(Some(KID)).await.unwrap();

    server.set_keys(key_set(&[(ROTATED_KID, other_key())]));
    cache.get_key(Some(ROTATED_KID)).await.unwrap();
    assert_eq!(server.jwks_fetch_count(), 2);
}

#[tokio::test]
async fn test_stale_cache_refetches() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::ZERO);

    cache.get_key(Some(KID)).await.unwrap();
    cache.get_key(Some(KID)).await.unwrap();

    assert_eq!(server.jwks_fetch_count(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::from_secs(3600));
    cache.get_key(Some(KID)).await.unwrap();

    cache.invalidate().await;
    assert!(cache.cached_key_ids().await.is_empty());
    cache.get_key(Some(KID)).await.unwrap();

    assert_eq!(server.jwks_fetch_count(), 2);
}

#[tokio::test]
async fn test_missing_kid_needs_single_key_set() {
    let server = MockAuthorizationServer::new();
    let cache = cache(&server, Duration::from_secs(3600));
    cache.get_key(None).await.unwrap();

    server.set_keys(key_set(&[(KID, signing_key()), (ROTATED_KID, other_key())]));
    cache.invalidate().await;
    let err = cache.get_key(None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::KeyNotFound);
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let server = MockAuthorizationServer::new();
    *server.jwks_fails.lock().unwrap() = true;
    let cache = cache(&server, Duration::from_secs(3600));

    let err = cache.get_key(Some(KID)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::JwksFetchFailed);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_fetch_times_out() {
    let server = MockAuthorizationServer::new();
    *server.jwks_hangs.lock().unwrap() = true;
    let cache = cache(&server, Duration::from_secs(3600));

    let err = cache.get_key(Some(KID)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::JwksFetchFailed);
}

#[tokio::test]
async fn test_non_rsa_and_short_keys_are_rejected() {
    let server = MockAuthorizationServer::new();
    server.set_keys(JsonWebKeySet {
        keys: vec![
            JsonWebKey {
                kty: "EC".to_owned(),
                key_use: Some("sig".to_owned()),
                kid: Some("ec-key".to_owned()),
                alg: Some("ES256".to_owned()),
                n: None,
                e: None,
            },
            JsonWebKey {
                kty: "RSA".to_owned(),
                key_use: Some("sig".to_owned()),
                kid: Some("tiny".to_owned()),
                alg: Some("RS256".to_owned()),
                // 512-bit modulus
                n: Some(format!("w{}", "A".repeat(85))),
                e: Some("AQAB".to_owned()),
            },
        ],
    });
    let cache = cache(&server, Duration::from_secs(3600));

    let err = cache.get_key(Some("ec-key")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnsupportedKeyType);
    let err = cache.get_key(Some("tiny")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnsupportedKeyType);
}
