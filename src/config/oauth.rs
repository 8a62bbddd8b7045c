// ABOUTME: OAuth 2.1 handler configuration loaded from environment with strict validation
// ABOUTME: Rejects PKCE opt-out without acknowledgement and any shared-secret path outside development mode
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use std::env;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use docaiche_auth_core::constants::{audit_events, defaults, pkce};
use docaiche_auth_core::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::utils::short_fingerprint;

/// Minimum length accepted for the development HS256 secret
const MIN_DEV_SECRET_LEN: usize = 32;

/// Configuration of the OAuth 2.1 handler and its remote authorization server
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth21Config {
    /// Name reported in provider info and audit metadata
    pub provider_name: String,
    /// Client identifier registered with the authorization server
    pub client_id: String,
    /// Client secret for confidential clients
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Authorization endpoint the user agent is redirected to
    pub authorization_endpoint: String,
    /// Token endpoint for code exchange and refresh
    pub token_endpoint: String,
    /// RFC 7662 introspection endpoint
    pub introspection_endpoint: Option<String>,
    /// RFC 7009 revocation endpoint
    pub revocation_endpoint: Option<String>,
    /// JWK Set location for RS256 signature verification
    pub jwks_uri: Option<String>,
    /// Expected `iss` claim
    pub issuer: Option<String>,
    /// PKCE is mandatory under OAuth 2.1
    pub require_pkce: bool,
    /// Explicit acknowledgement required to run with `require_pkce = false`
    pub pkce_opt_out_acknowledged: bool,
    /// Reject flows that name no resource indicator
    pub require_resource_indicators: bool,
    /// Resource URNs (or URN prefixes) this deployment may issue tokens for
    pub allowed_resource_servers: Vec<String>,
    /// Namespace every protected resource URN must start with
    pub base_resource_urn: String,
    /// Access token lifetime when the server omits `expires_in`
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime reported in provider info
    pub refresh_token_ttl_secs: u64,
    /// Whether the authorization server rotates refresh tokens
    pub refresh_token_rotation: bool,
    /// JWKS cache freshness window
    pub jwks_cache_ttl_secs: u64,
    /// Unknown-kid refetches are skipped while the cached set is younger than this
    pub jwks_min_refetch_interval_secs: u64,
    /// PKCE challenge lifetime
    pub pkce_max_age_secs: u64,
    /// Pending authorization request lifetime
    pub authorization_request_max_age_secs: u64,
    /// Upper bound for every remote call
    pub http_timeout_secs: u64,
    /// Clock skew tolerated on `exp`
    pub jwt_leeway_secs: u64,
    /// Treat the token as active when introspection itself fails
    pub introspection_fail_open: bool,
    /// Enables the HS256 shared-secret path (requires the `dev-hs256` feature)
    pub development_mode: bool,
    /// Shared secret for development-mode HS256 tokens
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
}

impl Default for OAuth21Config {
    fn default() -> Self {
        Self {
            provider_name: defaults::PROVIDER_NAME.to_owned(),
            client_id: String::new(),
            client_secret: None,
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            introspection_endpoint: None,
            revocation_endpoint: None,
            jwks_uri: None,
            issuer: None,
            require_pkce: true,
            pkce_opt_out_acknowledged: false,
            require_resource_indicators: true,
            allowed_resource_servers: Vec::new(),
            base_resource_urn: defaults::BASE_RESOURCE_URN.to_owned(),
            access_token_ttl_secs: defaults::ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: defaults::REFRESH_TOKEN_TTL_SECS,
            refresh_token_rotation: true,
            jwks_cache_ttl_secs: defaults::JWKS_CACHE_TTL_SECS,
            jwks_min_refetch_interval_secs: defaults::JWKS_MIN_REFETCH_INTERVAL_SECS,
            pkce_max_age_secs: pkce::DEFAULT_MAX_AGE_SECS,
            authorization_request_max_age_secs: defaults::AUTHORIZATION_REQUEST_MAX_AGE_SECS,
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
            jwt_leeway_secs: defaults::JWT_LEEWAY_SECS,
            introspection_fail_open: true,
            development_mode: false,
            jwt_secret: None,
        }
    }
}

impl Debug for OAuth21Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth21Config")
            .field("provider_name", &self.provider_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("introspection_endpoint", &self.introspection_endpoint)
            .field("revocation_endpoint", &self.revocation_endpoint)
            .field("jwks_uri", &self.jwks_uri)
            .field("issuer", &self.issuer)
            .field("require_pkce", &self.require_pkce)
            .field("require_resource_indicators", &self.require_resource_indicators)
            .field("base_resource_urn", &self.base_resource_urn)
            .field("development_mode", &self.development_mode)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl OAuth21Config {
    /// Load configuration from `OAUTH21_*` environment variables
    ///
    /// Unset variables keep their defaults. The result is validated before it
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` if a variable cannot be parsed or the resulting
    /// configuration fails [`OAuth21Config::validate`]
    pub fn from_env() -> AuthResult<Self> {
        let base = Self::default();
        let config = Self {
            provider_name: env_var_or("OAUTH21_PROVIDER_NAME", &base.provider_name),
            client_id: env_var_or("OAUTH21_CLIENT_ID", ""),
            client_secret: env_opt("OAUTH21_CLIENT_SECRET"),
            authorization_endpoint: env_var_or("OAUTH21_AUTHORIZATION_ENDPOINT", ""),
            token_endpoint: env_var_or("OAUTH21_TOKEN_ENDPOINT", ""),
            introspection_endpoint: env_opt("OAUTH21_INTROSPECTION_ENDPOINT"),
            revocation_endpoint: env_opt("OAUTH21_REVOCATION_ENDPOINT"),
            jwks_uri: env_opt("OAUTH21_JWKS_URI"),
            issuer: env_opt("OAUTH21_ISSUER"),
            require_pkce: env_bool("OAUTH21_REQUIRE_PKCE", base.require_pkce)?,
            pkce_opt_out_acknowledged: env_bool(
                "OAUTH21_PKCE_OPT_OUT_ACKNOWLEDGED",
                base.pkce_opt_out_acknowledged,
            )?,
            require_resource_indicators: env_bool(
                "OAUTH21_REQUIRE_RESOURCE_INDICATORS",
                base.require_resource_indicators,
            )?,
            allowed_resource_servers: env_opt("OAUTH21_ALLOWED_RESOURCE_SERVERS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            base_resource_urn: env_var_or("OAUTH21_BASE_RESOURCE_URN", &base.base_resource_urn),
            access_token_ttl_secs: env_u64(
                "OAUTH21_ACCESS_TOKEN_TTL",
                base.access_token_ttl_secs,
            )?,
            refresh_token_ttl_secs: env_u64(
                "OAUTH21_REFRESH_TOKEN_TTL",
                base.refresh_token_ttl_secs,
            )?,
            refresh_token_rotation: env_bool(
                "OAUTH21_REFRESH_TOKEN_ROTATION",
                base.refresh_token_rotation,
            )?,
            jwks_cache_ttl_secs: env_u64("OAUTH21_JWKS_CACHE_TTL", base.jwks_cache_ttl_secs)?,
            jwks_min_refetch_interval_secs: env_u64(
                "OAUTH21_JWKS_MIN_REFETCH_INTERVAL",
                base.jwks_min_refetch_interval_secs,
            )?,
            pkce_max_age_secs: env_u64("OAUTH21_PKCE_MAX_AGE", base.pkce_max_age_secs)?,
            authorization_request_max_age_secs: env_u64(
                "OAUTH21_AUTHORIZATION_REQUEST_MAX_AGE",
                base.authorization_request_max_age_secs,
            )?,
            http_timeout_secs: env_u64("OAUTH21_HTTP_TIMEOUT", base.http_timeout_secs)?,
            jwt_leeway_secs: env_u64("OAUTH21_JWT_LEEWAY", base.jwt_leeway_secs)?,
            introspection_fail_open: env_bool(
                "OAUTH21_INTROSPECTION_FAIL_OPEN",
                base.introspection_fail_open,
            )?,
            development_mode: env_bool("OAUTH21_DEVELOPMENT_MODE", base.development_mode)?,
            jwt_secret: env_opt("OAUTH21_JWT_SECRET"),
        };

        config.validate()?;
        info!(
            provider = %config.provider_name,
            summary = %config.redacted_summary(),
            "OAuth 2.1 configuration loaded"
        );
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` describing the first violated rule
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::config("client_id is required"));
        }
        validate_endpoint("authorization_endpoint", &self.authorization_endpoint)?;
        validate_endpoint("token_endpoint", &self.token_endpoint)?;
        for (name, endpoint) in [
            ("introspection_endpoint", &self.introspection_endpoint),
            ("revocation_endpoint", &self.revocation_endpoint),
            ("jwks_uri", &self.jwks_uri),
        ] {
            if let Some(endpoint) = endpoint {
                validate_endpoint(name, endpoint)?;
            }
        }

        self.validate_resource_namespace()?;
        self.validate_pkce_policy()?;
        self.validate_signing_mode()?;

        if self.pkce_max_age_secs == 0 || self.authorization_request_max_age_secs == 0 {
            return Err(AuthError::config(
                "pkce_max_age_secs and authorization_request_max_age_secs must be positive",
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(AuthError::config("http_timeout_secs must be positive"));
        }
        Ok(())
    }

    fn validate_resource_namespace(&self) -> AuthResult<()> {
        let mut parts = self.base_resource_urn.splitn(3, ':');
        let well_formed = parts.next() == Some("urn")
            && parts.next().is_some_and(|ns| !ns.is_empty());
        if !well_formed {
            return Err(AuthError::config(format!(
                "base_resource_urn '{}' must look like urn:<namespace>",
                self.base_resource_urn
            )));
        }
        if let Some(outside) = self
            .allowed_resource_servers
            .iter()
            .find(|urn| {
                !urn.strip_prefix(self.base_resource_urn.as_str())
                    .is_some_and(|rest| rest.starts_with(':'))
            })
        {
            return Err(AuthError::config(format!(
                "allowed resource server {outside} is outside {}",
                self.base_resource_urn
            )));
        }
        Ok(())
    }

    fn validate_pkce_policy(&self) -> AuthResult<()> {
        if self.require_pkce {
            return Ok(());
        }
        if !self.pkce_opt_out_acknowledged {
            return Err(AuthError::config(
                "require_pkce=false is non-compliant with OAuth 2.1 and needs pkce_opt_out_acknowledged=true",
            ));
        }
        warn!(
            event = audit_events::PKCE_OVERRIDE,
            client_id = %self.client_id,
            "PKCE requirement disabled by explicit override; this deployment is not OAuth 2.1 compliant"
        );
        Ok(())
    }

    fn validate_signing_mode(&self) -> AuthResult<()> {
        if self.jwt_secret.is_some() && !self.development_mode {
            return Err(AuthError::config(
                "jwt_secret is only accepted when development_mode is enabled",
            ));
        }
        if self.development_mode {
            if !cfg!(feature = "dev-hs256") {
                return Err(AuthError::config(
                    "development_mode requires a build with the dev-hs256 feature",
                ));
            }
            let secret_len = self.jwt_secret.as_ref().map_or(0, String::len);
            if secret_len < MIN_DEV_SECRET_LEN {
                return Err(AuthError::config(format!(
                    "development_mode requires a jwt_secret of at least {MIN_DEV_SECRET_LEN} bytes"
                )));
            }
            warn!(
                client_id = %self.client_id,
                "development_mode enabled: HS256 shared-secret tokens will be accepted"
            );
            return Ok(());
        }
        if self.jwks_uri.is_none() {
            return Err(AuthError::config(
                "jwks_uri is required unless development_mode is enabled",
            ));
        }
        Ok(())
    }

    /// Remote call timeout
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Configuration summary safe to log, with secrets fingerprinted
    #[must_use]
    pub fn redacted_summary(&self) -> serde_json::Value {
        json!({
            "provider_name": self.provider_name,
            "client_id": self.client_id,
            "client_secret_fingerprint": self.client_secret.as_deref().map(short_fingerprint),
            "authorization_endpoint": self.authorization_endpoint,
            "token_endpoint": self.token_endpoint,
            "introspection_endpoint": self.introspection_endpoint,
            "revocation_endpoint": self.revocation_endpoint,
            "jwks_uri": self.jwks_uri,
            "issuer": self.issuer,
            "require_pkce": self.require_pkce,
            "require_resource_indicators": self.require_resource_indicators,
            "base_resource_urn": self.base_resource_urn,
            "development_mode": self.development_mode,
        })
    }
}

/// Endpoints must be absolute https URLs; plain http only for loopback hosts
fn validate_endpoint(name: &str, value: &str) -> AuthResult<()> {
    let url = Url::parse(value)
        .map_err(|e| AuthError::config(format!("{name} '{value}' is not a valid URL: {e}")))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")) => Ok(()),
        scheme => Err(AuthError::config(format!(
            "{name} must use https (http only for loopback), got {scheme}"
        ))),
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> AuthResult<bool> {
    env_opt(key).map_or(Ok(default), |raw| {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(AuthError::config(format!(
                "{key} must be a boolean, got '{other}'"
            ))),
        }
    })
}

fn env_u64(key: &str, default: u64) -> AuthResult<u64> {
    env_opt(key).map_or(Ok(default), |raw| {
        raw.trim().parse().map_err(|e| {
            AuthError::config(format!("{key} must be a non-negative integer: {e}"))
        })
    })
}

/// Split a comma or whitespace separated list
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
