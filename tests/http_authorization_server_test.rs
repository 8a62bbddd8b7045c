// ABOUTME: Wire-level tests for the HTTP authorization server client using wiremock
// ABOUTME: Form encoding, repeated resource parameters, RFC 6749 error bodies and JWKS retrieval
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{init_test_logging, key_set, signing_key, valid_token, KID, REDIRECT_URI, SEARCH};
use docaiche_auth::config::OAuth21Config;
use docaiche_auth::oauth21::{
    AuthorizationServer, CodeExchange, Credentials, FlowOptions, HttpAuthorizationServer,
    InMemoryTokenStore, OAuth21Handler, RefreshGrant, RemoteError,
};
use docaiche_auth::security::TracingAuditor;
use docaiche_auth::ErrorCode;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENCODED_SEARCH: &str = "resource=urn%3Adocaiche%3Atool%3Asearch";
const ENCODED_DOCS: &str = "resource=urn%3Adocaiche%3Adocs";

fn config_for(server: &MockServer) -> OAuth21Config {
    let base = server.uri();
    OAuth21Config {
        client_id: "docaiche-agent".to_owned(),
        client_secret: Some("client-secret".to_owned()),
        authorization_endpoint: format!("{base}/authorize"),
        token_endpoint: format!("{base}/token"),
        introspection_endpoint: Some(format!("{base}/introspect")),
        revocation_endpoint: Some(format!("{base}/revoke")),
        jwks_uri: Some(format!("{base}/jwks")),
        issuer: Some(common::ISSUER.to_owned()),
        http_timeout_secs: 5,
        ..OAuth21Config::default()
    }
}

fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 900,
        "refresh_token": "refresh-abc",
        "scope": "read write",
    })
}

#[tokio::test]
async fn test_code_exchange_posts_form_with_repeated_resources() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("code_verifier=verifier-value"))
        .and(body_string_contains(ENCODED_SEARCH))
        .and(body_string_contains(ENCODED_DOCS))
        .and(body_string_contains("client_id=docaiche-agent"))
        .and(body_string_contains("client_secret=client-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-1")))
        .expect(1)
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let response = client
        .exchange_code(&CodeExchange {
            code: "auth-code".to_owned(),
            redirect_uri: REDIRECT_URI.to_owned(),
            code_verifier: "verifier-value".to_owned(),
            resources: vec![SEARCH.to_owned(), "urn:docaiche:docs".to_owned()],
        })
        .await
        .unwrap();

    assert_eq!(response.access_token, "at-1");
    assert_eq!(response.expires_in, Some(900));
    assert_eq!(response.refresh_token.as_deref(), Some("refresh-abc"));
}

#[tokio::test]
async fn test_refresh_grant_sends_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-old"))
        .and(body_string_contains(ENCODED_SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-2")))
        .expect(1)
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let response = client
        .refresh(&RefreshGrant {
            refresh_token: "refresh-old".to_owned(),
            resources: vec![SEARCH.to_owned()],
        })
        .await
        .unwrap();
    assert_eq!(response.access_token, "at-2");
}

#[tokio::test]
async fn test_error_body_is_parsed_and_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code already used",
        })))
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let err = client
        .refresh(&RefreshGrant {
            refresh_token: "used".to_owned(),
            resources: Vec::new(),
        })
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    assert_eq!(err.oauth_error(), Some("invalid_grant"));
    match err {
        RemoteError::Status {
            status,
            description,
            ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(description.as_deref(), Some("code already used"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let err = client
        .refresh(&RefreshGrant {
            refresh_token: "r".to_owned(),
            resources: Vec::new(),
        })
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.oauth_error(), None);
}

#[tokio::test]
async fn test_non_json_success_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let err = client
        .refresh(&RefreshGrant {
            refresh_token: "r".to_owned(),
            resources: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_introspection_and_revocation_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/introspect"))
        .and(body_string_contains("token=opaque-token"))
        .and(body_string_contains("token_type_hint=access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": false,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=opaque-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let introspection = client
        .introspect("opaque-token", Some("access_token"))
        .await
        .unwrap();
    assert!(!introspection.active);
    client.revoke("opaque-token", None).await.unwrap();
}

#[tokio::test]
async fn test_unconfigured_endpoints_are_reported() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.introspection_endpoint = None;
    config.revocation_endpoint = None;
    let client = HttpAuthorizationServer::from_config(&config).unwrap();

    assert!(matches!(
        client.introspect("t", None).await.unwrap_err(),
        RemoteError::NotConfigured("introspection_endpoint")
    ));
    assert!(matches!(
        client.revoke("t", None).await.unwrap_err(),
        RemoteError::NotConfigured("revocation_endpoint")
    ));
}

#[tokio::test]
async fn test_key_set_is_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::to_value(key_set(&[(KID, signing_key())])).unwrap()),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = HttpAuthorizationServer::from_config(&config_for(&server)).unwrap();

    let keys = client.fetch_key_set().await.unwrap();
    assert_eq!(keys.keys.len(), 1);
    assert_eq!(keys.keys[0].kid.as_deref(), Some(KID));
    keys.keys[0].decoding_key().unwrap();
}

#[tokio::test]
async fn test_handler_completes_flow_over_http() {
    init_test_logging();
    let server = MockServer::start().await;
    let access_token = valid_token(&[SEARCH], "read write");
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::to_value(key_set(&[(KID, signing_key())])).unwrap()),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(ENCODED_SEARCH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(&access_token)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active": true})))
        .mount(&server)
        .await;

    let handler = OAuth21Handler::from_config(
        config_for(&server),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(TracingAuditor::new()),
    )
    .unwrap();
    let flow = handler
        .initiate_auth_flow(
            REDIRECT_URI,
            "read write",
            &[SEARCH.to_owned()],
            FlowOptions::default(),
        )
        .await
        .unwrap();
    assert!(flow.authorization_url.starts_with(&server.uri()));

    let token = handler
        .authenticate(
            &Credentials {
                code: "auth-code".to_owned(),
                code_verifier: flow.pkce.verifier.clone(),
                state: flow.state.clone(),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(token.access_token, access_token);
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-abc"));
    assert!(handler
        .validate_token(&access_token, Some("read"), &[SEARCH.to_owned()])
        .await);
}

#[tokio::test]
async fn test_handler_maps_unreachable_server_to_remote_unavailable() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    // nothing listens on the discard port
    config.token_endpoint = "http://127.0.0.1:9/token".to_owned();
    let handler = OAuth21Handler::from_config(
        config,
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(TracingAuditor::new()),
    )
    .unwrap();
    let flow = handler
        .initiate_auth_flow(REDIRECT_URI, "read", &[SEARCH.to_owned()], FlowOptions::default())
        .await
        .unwrap();

    let err = handler
        .authenticate(
            &Credentials {
                code: "auth-code".to_owned(),
                code_verifier: flow.pkce.verifier.clone(),
                state: flow.state.clone(),
            },
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::OauthAuthFailed);
    assert!(handler.tracker().is_pending(&flow.state));
}
