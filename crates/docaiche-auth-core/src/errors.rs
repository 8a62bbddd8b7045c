// ABOUTME: Error taxonomy for OAuth 2.1 authorization with stable machine-readable codes
// ABOUTME: Maps every failure to a category, an HTTP-equivalent status and a generic public message
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! # Authorization Errors
//!
//! Every component of the authorization subsystem fails with an [`AuthError`]
//! carrying a stable [`ErrorCode`]. The code fixes the [`ErrorCategory`]
//! (validation, authentication, authorization, security), so callers can
//! decide between "fix the input", "log in again", "forbidden" and
//! "infrastructure alarm" without parsing messages.
//!
//! The `message` of an error is diagnostic detail meant for audit records and
//! logs. Anything returned to an untrusted caller must use
//! [`AuthError::public_message`], which never reveals which credential was
//! wrong.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Broad failure class, used for retry and response decisions
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Malformed input; local and never retried
    Validation,
    /// Expired or invalid credentials, failed exchange; may prompt re-login
    Authentication,
    /// Insufficient scope or disallowed resource/operation (403-equivalent)
    Authorization,
    /// Infrastructure misconfiguration such as unreachable JWKS
    Security,
}

impl ErrorCategory {
    /// Name used in audit records and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::Authentication => "AuthenticationError",
            Self::Authorization => "AuthorizationError",
            Self::Security => "SecurityError",
        }
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable machine-readable error codes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // PKCE
    /// Challenge method other than S256
    InvalidPkceMethod,
    /// Recomputed challenge does not match the stored one
    PkceVerificationFailed,

    // Authorization request tracking
    /// Unknown, expired or already consumed state
    InvalidState,
    /// Caller supplied a state that is already pending
    DuplicateState,

    // Resource indicators
    /// No registered resource matches the URN or any ancestor
    UnknownResource,
    /// URN is malformed or outside the deployment namespace
    InvalidResourceUrn,
    /// Resource indicators are required but none were given
    MissingResourceIndicator,
    /// Resource is not permitted for this deployment or request
    ResourceNotAllowed,
    /// Requested scopes do not cover the resource requirements
    InsufficientScope,
    /// Operation is not in the resource's allowed operations
    OperationNotAllowed,

    // Keys and tokens
    /// Signing keys could not be fetched
    JwksFetchFailed,
    /// No signing key with the token's key id
    KeyNotFound,
    /// JWK uses a key type this subsystem cannot verify with
    UnsupportedKeyType,
    /// Token header declares an algorithm that is not accepted
    UnsupportedAlgorithm,
    /// Token cannot be parsed
    MalformedToken,
    /// A required claim or header field is absent
    MissingClaim,
    /// Token `exp` is in the past
    TokenExpired,
    /// Signature verification failed
    InvalidSignature,
    /// Token audience does not match
    InvalidAudience,
    /// Token issuer does not match
    InvalidIssuer,
    /// Token was revoked locally
    TokenRevoked,
    /// Introspection reported the token inactive
    TokenInactive,

    // Orchestration
    /// Authorization code flow failed
    OauthAuthFailed,
    /// Refresh grant failed
    RefreshFailed,
    /// Remote authorization server endpoint unavailable
    RemoteUnavailable,

    // Configuration
    /// Configuration rejected at construction time
    ConfigInvalid,
}

impl ErrorCode {
    /// Category of this code
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::InvalidPkceMethod
            | Self::PkceVerificationFailed
            | Self::DuplicateState
            | Self::UnknownResource
            | Self::InvalidResourceUrn
            | Self::MissingResourceIndicator
            | Self::KeyNotFound
            | Self::UnsupportedAlgorithm
            | Self::MalformedToken
            | Self::MissingClaim => ErrorCategory::Validation,

            Self::InvalidState
            | Self::TokenExpired
            | Self::InvalidSignature
            | Self::InvalidAudience
            | Self::InvalidIssuer
            | Self::TokenRevoked
            | Self::TokenInactive
            | Self::OauthAuthFailed
            | Self::RefreshFailed => ErrorCategory::Authentication,

            Self::ResourceNotAllowed | Self::InsufficientScope | Self::OperationNotAllowed => {
                ErrorCategory::Authorization
            }

            Self::JwksFetchFailed
            | Self::UnsupportedKeyType
            | Self::RemoteUnavailable
            | Self::ConfigInvalid => ErrorCategory::Security,
        }
    }

    /// Wire representation of the code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPkceMethod => "INVALID_PKCE_METHOD",
            Self::PkceVerificationFailed => "PKCE_VERIFICATION_FAILED",
            Self::InvalidState => "INVALID_STATE",
            Self::DuplicateState => "DUPLICATE_STATE",
            Self::UnknownResource => "UNKNOWN_RESOURCE",
            Self::InvalidResourceUrn => "INVALID_RESOURCE_URN",
            Self::MissingResourceIndicator => "MISSING_RESOURCE_INDICATOR",
            Self::ResourceNotAllowed => "RESOURCE_NOT_ALLOWED",
            Self::InsufficientScope => "INSUFFICIENT_SCOPE",
            Self::OperationNotAllowed => "OPERATION_NOT_ALLOWED",
            Self::JwksFetchFailed => "JWKS_FETCH_FAILED",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::UnsupportedKeyType => "UNSUPPORTED_KEY_TYPE",
            Self::UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::MissingClaim => "MISSING_CLAIM",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidAudience => "INVALID_AUDIENCE",
            Self::InvalidIssuer => "INVALID_ISSUER",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenInactive => "TOKEN_INACTIVE",
            Self::OauthAuthFailed => "OAUTH_AUTH_FAILED",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::ConfigInvalid => "CONFIG_INVALID",
        }
    }

    /// HTTP-equivalent status for transports that need one
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::Authentication => 401,
            ErrorCategory::Authorization => 403,
            ErrorCategory::Security => match self {
                Self::JwksFetchFailed | Self::RemoteUnavailable => 502,
                _ => 500,
            },
        }
    }

    /// Generic description safe to return to untrusted callers
    #[must_use]
    pub const fn public_message(self) -> &'static str {
        match self.category() {
            ErrorCategory::Validation => "The request is malformed",
            ErrorCategory::Authentication => "Authentication failed",
            ErrorCategory::Authorization => "Access to the requested resource is denied",
            ErrorCategory::Security => "The authorization service is unavailable",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization subsystem error
#[derive(Debug, thiserror::Error)]
#[error("{}({code}): {message}", .code.category())]
pub struct AuthError {
    /// Stable machine-readable code
    pub code: ErrorCode,
    /// Diagnostic detail for audit records, never shown to callers
    pub message: String,
    /// Underlying cause
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AuthError {
    /// Create an error with the given code and diagnostic message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Category derived from the code
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// HTTP-equivalent status
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Generic message safe for untrusted callers
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        self.code.public_message()
    }

    /// Whether this error carries the given code
    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Structured detail for audit metadata
    #[must_use]
    pub fn audit_detail(&self) -> serde_json::Value {
        let mut detail = serde_json::json!({
            "error_code": self.code.as_str(),
            "error_category": self.category().as_str(),
            "message": self.message,
        });
        if let Some(source) = &self.source {
            detail["cause"] = serde_json::Value::String(source.to_string());
        }
        detail
    }

    /// PKCE method other than S256
    pub fn invalid_pkce_method(method: &str) -> Self {
        Self::new(
            ErrorCode::InvalidPkceMethod,
            format!("code_challenge_method '{method}' is not supported, only S256"),
        )
    }

    /// Unknown or expired authorization state
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    /// Configuration rejected
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Requested scopes do not cover the resource requirements
    pub fn insufficient_scope(resource: &str, missing: &[String]) -> Self {
        Self::new(
            ErrorCode::InsufficientScope,
            format!(
                "resource {resource} requires missing scopes: {}",
                missing.join(" ")
            ),
        )
    }
}

#[cfg(feature = "http-response")]
impl AuthError {
    /// HTTP status as an `http::StatusCode`
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        http::StatusCode::from_u16(self.http_status())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Result alias for authorization operations
pub type AuthResult<T> = Result<T, AuthError>;
