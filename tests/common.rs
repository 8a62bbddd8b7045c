// ABOUTME: Shared test utilities for the OAuth 2.1 integration tests
// ABOUTME: RSA signing keys, JWT minting, a scriptable authorization server and a recording auditor
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]
//! Shared test utilities for `docaiche_auth`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use docaiche_auth::config::OAuth21Config;
use docaiche_auth::oauth21::{
    AuthorizationServer, CodeExchange, InMemoryTokenStore, IntrospectionResponse, JsonWebKey,
    JsonWebKeySet, OAuth21Handler, RefreshGrant, RemoteError, ResourceRegistry, TokenResponse,
};
use docaiche_auth::security::{AuditEvent, SecurityAuditor};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};

pub const ISSUER: &str = "https://auth.example";
pub const KID: &str = "test-key-1";
pub const ROTATED_KID: &str = "test-key-2";
pub const SEARCH: &str = "urn:docaiche:tool:search";
pub const INGEST: &str = "urn:docaiche:tool:ingest";
pub const REDIRECT_URI: &str = "https://app.example/callback";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Primary signing key, generated once per test binary
pub fn signing_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
}

/// A second key, used for rotation and forged-signature scenarios
pub fn other_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
}

/// JWK Set publishing the given keys
pub fn key_set(keys: &[(&str, &RsaPrivateKey)]) -> JsonWebKeySet {
    JsonWebKeySet {
        keys: keys
            .iter()
            .map(|(kid, key)| JsonWebKey::from_rsa_public_key(kid, &RsaPublicKey::from(*key)))
            .collect(),
    }
}

/// Sign `claims` with RS256
pub fn mint(claims: &Value, kid: Option<&str>, key: &RsaPrivateKey) -> String {
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(ToOwned::to_owned);
    encode(&header, claims, &encoding_key).unwrap()
}

/// Standard claims bound to `resources`, expiring `ttl_secs` from now
pub fn claims(resources: &[&str], scope: &str, ttl_secs: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "sub": "agent-42",
        "aud": resources,
        "resource": resources,
        "scope": scope,
        "client_id": "docaiche-agent",
        "iat": now,
        "exp": now + ttl_secs,
        "jti": uuid::Uuid::new_v4().to_string(),
    })
}

/// A valid token for `resources` signed with the primary key
pub fn valid_token(resources: &[&str], scope: &str) -> String {
    mint(&claims(resources, scope, 3600), Some(KID), signing_key())
}

/// Scripted token endpoint behaviour
#[derive(Clone)]
pub enum Behavior {
    /// Return this token response
    Respond(TokenResponse),
    /// Return an HTTP error with an RFC 6749 error code
    Status(u16, &'static str),
    /// Fail before any response
    Transport,
    /// Never answer
    Hang,
}

impl Behavior {
    async fn run(&self) -> Result<TokenResponse, RemoteError> {
        match self {
            Self::Respond(response) => Ok(response.clone()),
            Self::Status(status, error) => Err(RemoteError::Status {
                status: *status,
                error: Some((*error).to_owned()),
                description: None,
            }),
            Self::Transport => Err(RemoteError::Transport("connection refused".to_owned())),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RemoteError::Transport("unreachable".to_owned()))
            }
        }
    }
}

/// Token response carrying `access_token`
pub fn token_response(access_token: String, refresh_token: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token,
        token_type: "Bearer".to_owned(),
        expires_in: Some(3600),
        refresh_token: refresh_token.map(ToOwned::to_owned),
        scope: Some("read write".to_owned()),
    }
}

/// In-process authorization server double
pub struct MockAuthorizationServer {
    pub keys: Mutex<JsonWebKeySet>,
    pub exchange: Mutex<Behavior>,
    pub refresh: Mutex<Behavior>,
    pub revoke_fails: Mutex<bool>,
    /// `None` makes introspection fail
    pub introspection_active: Mutex<Option<bool>>,
    pub exchange_delay: Mutex<Option<Duration>>,
    pub jwks_fails: Mutex<bool>,
    pub jwks_hangs: Mutex<bool>,
    pub exchanges: Mutex<Vec<CodeExchange>>,
    pub refresh_grants: Mutex<Vec<RefreshGrant>>,
    pub jwks_fetches: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub introspect_calls: AtomicUsize,
}

impl Default for MockAuthorizationServer {
    fn default() -> Self {
        Self {
            keys: Mutex::new(key_set(&[(KID, signing_key())])),
            exchange: Mutex::new(Behavior::Respond(token_response(
                valid_token(&[SEARCH], "read write"),
                Some("refresh-1"),
            ))),
            refresh: Mutex::new(Behavior::Respond(token_response(
                valid_token(&[SEARCH], "read write"),
                Some("refresh-2"),
            ))),
            revoke_fails: Mutex::new(false),
            introspection_active: Mutex::new(Some(true)),
            exchange_delay: Mutex::new(None),
            jwks_fails: Mutex::new(false),
            jwks_hangs: Mutex::new(false),
            exchanges: Mutex::new(Vec::new()),
            refresh_grants: Mutex::new(Vec::new()),
            jwks_fetches: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            introspect_calls: AtomicUsize::new(0),
        }
    }
}

impl MockAuthorizationServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_exchange(&self, behavior: Behavior) {
        *self.exchange.lock().unwrap() = behavior;
    }

    pub fn set_refresh(&self, behavior: Behavior) {
        *self.refresh.lock().unwrap() = behavior;
    }

    pub fn set_keys(&self, keys: JsonWebKeySet) {
        *self.keys.lock().unwrap() = keys;
    }

    pub fn jwks_fetch_count(&self) -> usize {
        self.jwks_fetches.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthorizationServer for MockAuthorizationServer {
    async fn exchange_code(&self, exchange: &CodeExchange) -> Result<TokenResponse, RemoteError> {
        self.exchanges.lock().unwrap().push(exchange.clone());
        let delay = *self.exchange_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let behavior = self.exchange.lock().unwrap().clone();
        behavior.run().await
    }

    async fn refresh(&self, grant: &RefreshGrant) -> Result<TokenResponse, RemoteError> {
        self.refresh_grants.lock().unwrap().push(grant.clone());
        let behavior = self.refresh.lock().unwrap().clone();
        behavior.run().await
    }

    async fn introspect(
        &self,
        _token: &str,
        _token_type_hint: Option<&str>,
    ) -> Result<IntrospectionResponse, RemoteError> {
        self.introspect_calls.fetch_add(1, Ordering::SeqCst);
        let active = *self.introspection_active.lock().unwrap();
        active
            .map(|active| IntrospectionResponse {
                active,
                ..IntrospectionResponse::default()
            })
            .ok_or(RemoteError::Status {
                status: 503,
                error: None,
                description: None,
            })
    }

    async fn revoke(&self, _token: &str, _token_type_hint: Option<&str>) -> Result<(), RemoteError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if *self.revoke_fails.lock().unwrap() {
            Err(RemoteError::Transport("revocation endpoint unreachable".to_owned()))
        } else {
            Ok(())
        }
    }

    async fn fetch_key_set(&self) -> Result<JsonWebKeySet, RemoteError> {
        self.jwks_fetches.fetch_add(1, Ordering::SeqCst);
        let hangs = *self.jwks_hangs.lock().unwrap();
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if *self.jwks_fails.lock().unwrap() {
            return Err(RemoteError::Status {
                status: 502,
                error: None,
                description: None,
            });
        }
        Ok(self.keys.lock().unwrap().clone())
    }
}

/// Auditor keeping every event in memory
#[derive(Default)]
pub struct RecordingAuditor {
    pub events: Mutex<Vec<AuditEvent>>,
    /// Events of this type are recorded, then the sink blocks for an hour
    pub stall_on: Mutex<Option<&'static str>>,
}

impl RecordingAuditor {
    pub fn of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SecurityAuditor for RecordingAuditor {
    async fn log_event(&self, event: AuditEvent) -> anyhow::Result<()> {
        let stalls = *self.stall_on.lock().unwrap() == Some(event.event_type.as_str());
        self.events.lock().unwrap().push(event);
        if stalls {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }
}

/// Production-shaped configuration pointing at fictional endpoints
pub fn test_config() -> OAuth21Config {
    OAuth21Config {
        client_id: "docaiche-agent".to_owned(),
        client_secret: Some("client-secret".to_owned()),
        authorization_endpoint: format!("{ISSUER}/authorize"),
        token_endpoint: format!("{ISSUER}/token"),
        revocation_endpoint: Some(format!("{ISSUER}/revoke")),
        jwks_uri: Some(format!("{ISSUER}/.well-known/jwks.json")),
        issuer: Some(ISSUER.to_owned()),
        http_timeout_secs: 2,
        ..OAuth21Config::default()
    }
}

/// Handler wired to `server` with in-memory collaborators
pub struct TestHarness {
    pub handler: OAuth21Handler,
    pub server: Arc<MockAuthorizationServer>,
    pub store: Arc<InMemoryTokenStore>,
    pub auditor: Arc<RecordingAuditor>,
}

pub fn harness_with(config: OAuth21Config, server: Arc<MockAuthorizationServer>) -> TestHarness {
    init_test_logging();
    let store = Arc::new(InMemoryTokenStore::new());
    let auditor = Arc::new(RecordingAuditor::default());
    let handler = OAuth21Handler::new(
        config,
        Arc::new(ResourceRegistry::docaiche_defaults().unwrap()),
        server.clone(),
        store.clone(),
        auditor.clone(),
    )
    .unwrap();
    TestHarness {
        handler,
        server,
        store,
        auditor,
    }
}

pub fn harness() -> TestHarness {
    harness_with(test_config(), MockAuthorizationServer::new())
}
