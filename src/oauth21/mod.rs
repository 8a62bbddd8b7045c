// ABOUTME: OAuth 2.1 authorization subsystem: PKCE, resource indicators, JWKS validation and token lifecycle
// ABOUTME: Components are listed leaf-first; the handler composes them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

/// PKCE verifier/challenge generation and verification
pub mod pkce;

/// Request, token and wire models
pub mod models;

/// Resource indicator registry
pub mod resources;

/// Pending authorization request tracking
pub mod request_tracker;

/// Remote authorization server seam
pub mod remote;

/// JWKS key cache
pub mod jwks;

/// Revoked token set
pub mod revocation;

/// Access token validation
pub mod validator;

/// Token store seam
pub mod token_store;

/// Orchestrator
pub mod handler;

pub use handler::{FlowOptions, OAuth21Handler};
pub use jwks::{JsonWebKey, JsonWebKeySet, JwksCache};
pub use models::{
    AuthToken, AuthorizationFlow, AuthorizationRequest, Credentials, IntrospectionResponse,
    ProviderInfo, TokenResponse,
};
pub use pkce::PkceChallenge;
pub use remote::{
    AuthorizationServer, CodeExchange, HttpAuthorizationServer, RefreshGrant, RemoteError,
};
pub use request_tracker::{AuthorizationParams, AuthorizationRequestTracker, ClaimGuard};
pub use resources::{ResourceDefinition, ResourceRegistry, SecurityLevel};
pub use revocation::RevocationCache;
pub use token_store::{InMemoryTokenStore, TokenStore};
pub use validator::{AccessTokenClaims, OneOrMany, TokenValidator, ValidationMode};
