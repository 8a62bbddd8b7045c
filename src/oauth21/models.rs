// ABOUTME: Data model for the OAuth 2.1 flow: pending requests, issued tokens and wire responses
// ABOUTME: Secrets are redacted from Debug output on every type that carries one
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};

use chrono::{DateTime, Utc};
use docaiche_auth_core::constants::grants;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pkce::PkceChallenge;

/// One pending login attempt, keyed by `state`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Client the flow was started for
    pub client_id: String,
    /// Redirect URI registered for the client
    pub redirect_uri: String,
    /// Always `code`
    pub response_type: String,
    /// Space-separated requested scope
    pub scope: String,
    /// Unique among concurrently pending requests
    pub state: String,
    /// S256 challenge sent to the authorization server
    pub code_challenge: String,
    /// Always `S256`
    pub code_challenge_method: String,
    /// Resource URNs bound to this attempt
    pub resource_indicators: Vec<String>,
    /// OpenID nonce when one was requested
    pub nonce: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Result of `initiate_auth_flow`
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    /// URL the user agent is redirected to
    pub authorization_url: String,
    /// State value bound to this attempt
    pub state: String,
    /// PKCE pair; the verifier stays with the caller until the callback
    pub pkce: PkceChallenge,
}

/// Callback parameters presented to `authenticate`
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Authorization code from the callback
    pub code: String,
    /// PKCE verifier generated at initiation
    pub code_verifier: String,
    /// State from the callback
    pub state: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("code", &"***")
            .field("code_verifier", &"***")
            .field("state", &self.state)
            .finish()
    }
}

/// A token issued through this subsystem, handed to the token store
///
/// Refresh produces a new `AuthToken`; existing values are never mutated.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthToken {
    /// Local identifier for the issued token
    pub token_id: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Bearer access token (JWT)
    pub access_token: String,
    /// Refresh token, if the server issued one
    pub refresh_token: Option<String>,
    /// Expiry of the access token
    pub expires_at: DateTime<Utc>,
    /// Space-separated granted scope
    pub scope: String,
    /// Resource URN to the actions allowed on it
    pub resource_access: BTreeMap<String, Vec<String>>,
    /// Usually `Bearer`
    pub token_type: String,
    /// Provider, grant type, subject and similar details
    pub metadata: Value,
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token_id", &self.token_id)
            .field("client_id", &self.client_id)
            .field("access_token", &"***")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("resource_access", &self.resource_access)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

impl AuthToken {
    /// Whether the access token expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Granted scopes as a list
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }
}

/// Token endpoint success body (RFC 6749 §5.1)
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Token type
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token, absent when the server does not rotate
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
}

impl Debug for TokenResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("scope", &self.scope)
            .finish()
    }
}

fn default_token_type() -> String {
    grants::TOKEN_TYPE_BEARER.to_owned()
}

/// Introspection body (RFC 7662 §2.2); only `active` is required
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active
    pub active: bool,
    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
    /// Client the token was issued to
    #[serde(default)]
    pub client_id: Option<String>,
    /// Subject
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry as seconds since the epoch
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Static capability description returned by `get_provider_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name
    pub name: String,
    /// Protocol version
    pub oauth_version: String,
    /// Whether PKCE is enforced
    pub pkce_required: bool,
    /// PKCE methods offered
    pub code_challenge_methods_supported: Vec<String>,
    /// Whether resource indicators are enforced
    pub resource_indicators_required: bool,
    /// Whether refresh tokens rotate
    pub refresh_token_rotation: bool,
    /// Grant types used
    pub grant_types_supported: Vec<String>,
    /// Access token lifetime
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime
    pub refresh_token_ttl_secs: u64,
    /// Whether an introspection endpoint is configured
    pub introspection_enabled: bool,
    /// Whether a revocation endpoint is configured
    pub revocation_enabled: bool,
    /// Whether a JWKS endpoint is configured
    pub jwks_enabled: bool,
    /// Allowed resource servers
    pub allowed_resource_servers: Vec<String>,
    /// Whether the HS256 development path is active
    pub development_mode: bool,
}
