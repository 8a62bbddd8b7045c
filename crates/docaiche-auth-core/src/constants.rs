// ABOUTME: Protocol constants and defaults for the OAuth 2.1 authorization subsystem
// ABOUTME: PKCE parameters, token lifetimes, grant types and audit event names grouped by domain
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! Constants grouped by domain

/// PKCE (RFC 7636) parameters
pub mod pkce {
    /// The only challenge method OAuth 2.1 permits
    pub const METHOD_S256: &str = "S256";
    /// Random bytes behind each verifier (43 base64url characters)
    pub const VERIFIER_BYTES: usize = 32;
    /// Minimum verifier length (RFC 7636 §4.1)
    pub const VERIFIER_MIN_LEN: usize = 43;
    /// Maximum verifier length (RFC 7636 §4.1)
    pub const VERIFIER_MAX_LEN: usize = 128;
    /// Lifetime of a challenge, independent of the authorization request
    pub const DEFAULT_MAX_AGE_SECS: u64 = 600;
}

/// Default lifetimes and timeouts
pub mod defaults {
    /// Provider name reported by `get_provider_info`
    pub const PROVIDER_NAME: &str = "docaiche-oauth21";
    /// Base namespace for protected resources
    pub const BASE_RESOURCE_URN: &str = "urn:docaiche";
    /// Access token lifetime when the server omits `expires_in`
    pub const ACCESS_TOKEN_TTL_SECS: u64 = 3600;
    /// Refresh token lifetime
    pub const REFRESH_TOKEN_TTL_SECS: u64 = 30 * 24 * 3600;
    /// JWKS cache freshness window
    pub const JWKS_CACHE_TTL_SECS: u64 = 3600;
    /// Minimum gap between refetches caused by an unknown `kid`
    pub const JWKS_MIN_REFETCH_INTERVAL_SECS: u64 = 10;
    /// Pending authorization requests older than this are purged
    pub const AUTHORIZATION_REQUEST_MAX_AGE_SECS: u64 = 600;
    /// Upper bound for every remote call
    pub const HTTP_TIMEOUT_SECS: u64 = 10;
    /// Clock skew tolerated on `exp`
    pub const JWT_LEEWAY_SECS: u64 = 30;
    /// Random bytes behind generated `state` values
    pub const STATE_BYTES: usize = 32;
}

/// OAuth grant types and parameter values
pub mod grants {
    /// Authorization code grant
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Refresh token grant
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// The only response type issued
    pub const RESPONSE_TYPE_CODE: &str = "code";
    /// Default token type
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
}

/// Token type hints (RFC 7009 / RFC 7662)
pub mod token_hints {
    /// Access token hint
    pub const ACCESS_TOKEN: &str = "access_token";
}

/// Audit event type names
pub mod audit_events {
    /// Authorization flow started
    pub const AUTH_FLOW_INITIATED: &str = "oauth_flow_initiated";
    /// Code exchanged and token issued
    pub const AUTH_SUCCESS: &str = "oauth_authentication_success";
    /// Code flow failed
    pub const AUTH_FAILURE: &str = "oauth_authentication_failure";
    /// Refresh grant succeeded
    pub const TOKEN_REFRESHED: &str = "oauth_token_refreshed";
    /// Refresh grant failed
    pub const REFRESH_FAILURE: &str = "oauth_refresh_failure";
    /// Token revoked
    pub const TOKEN_REVOKED: &str = "oauth_token_revoked";
    /// Token rejected during validation
    pub const VALIDATION_FAILURE: &str = "oauth_token_validation_failure";
    /// PKCE requirement disabled by configuration
    pub const PKCE_OVERRIDE: &str = "oauth_pkce_override";
}
