// ABOUTME: OAuth 2.1 orchestrator composing PKCE, request tracking, resource registry, validation and revocation
// ABOUTME: Exposes initiate/authenticate/validate/refresh/revoke/provider-info over an injected authorization server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! # OAuth 2.1 handler
//!
//! Per authorization attempt the state moves from pending to exactly one of
//! consumed-success, consumed-failure or expired. `authenticate` claims the
//! pending request for the duration of the exchange: a transient remote
//! failure or a dropped future puts it back, anything else removes it.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use docaiche_auth_core::constants::{audit_events, grants, pkce};
use docaiche_auth_core::{AuthError, AuthResult, ErrorCategory, ErrorCode};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::jwks::JwksCache;
use super::models::{AuthToken, AuthorizationFlow, Credentials, ProviderInfo, TokenResponse};
use super::remote::{
    AuthorizationServer, CodeExchange, HttpAuthorizationServer, RefreshGrant, RemoteError,
};
use super::request_tracker::{
    generate_state, AuthorizationParams, AuthorizationRequestTracker, PendingAuthorization,
};
use super::resources::{ResourceDefinition, ResourceRegistry};
use super::revocation::RevocationCache;
use super::token_store::TokenStore;
use super::validator::{AccessTokenClaims, TokenValidator, ValidationMode};
use crate::config::OAuth21Config;
use crate::security::audit::{emit, AuditEvent, AuditSeverity, SecurityAuditor};
use crate::utils::short_fingerprint;

/// Optional parameters for [`OAuth21Handler::initiate_auth_flow`]
#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    /// Caller-chosen state; generated when absent
    pub state: Option<String>,
    /// OpenID nonce forwarded to the authorization server
    pub nonce: Option<String>,
}

/// How a failed exchange leaves the pending request
enum ExchangeFailure {
    /// The exchange may not have completed; the request can be retried
    Transient(AuthError),
    /// The attempt is over; the request is discarded
    Definitive(AuthError),
}

/// A persisted token whose claim has not been committed yet
struct IssuedToken {
    token: AuthToken,
    subject: Option<String>,
    resources: Vec<String>,
}

/// OAuth 2.1 authorization orchestrator
pub struct OAuth21Handler {
    config: OAuth21Config,
    registry: Arc<ResourceRegistry>,
    tracker: AuthorizationRequestTracker,
    validator: TokenValidator,
    revocations: Arc<RevocationCache>,
    jwks: Option<Arc<JwksCache>>,
    server: Arc<dyn AuthorizationServer>,
    token_store: Arc<dyn TokenStore>,
    auditor: Arc<dyn SecurityAuditor>,
}

impl OAuth21Handler {
    /// Build a handler from explicit collaborators
    ///
    /// The signature verification strategy is chosen here, once: RS256 via
    /// JWKS, or HS256 when `development_mode` is set in a `dev-hs256` build.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` if the configuration fails validation or the
    /// registry namespace differs from `base_resource_urn`
    pub fn new(
        config: OAuth21Config,
        registry: Arc<ResourceRegistry>,
        server: Arc<dyn AuthorizationServer>,
        token_store: Arc<dyn TokenStore>,
        auditor: Arc<dyn SecurityAuditor>,
    ) -> AuthResult<Self> {
        config.validate()?;
        if registry.base_urn() != config.base_resource_urn {
            return Err(AuthError::config(format!(
                "resource registry namespace {} does not match base_resource_urn {}",
                registry.base_urn(),
                config.base_resource_urn
            )));
        }

        let tracker = AuthorizationRequestTracker::new(
            Arc::clone(&registry),
            &config.authorization_endpoint,
            config.authorization_request_max_age_secs,
            config.pkce_max_age_secs,
        )?;
        let revocations = Arc::new(RevocationCache::new());
        let (mode, jwks) = Self::validation_mode(&config, &server)?;

        let mut validator = TokenValidator::new(mode, Arc::clone(&revocations))
            .with_issuer(config.issuer.clone())
            .with_default_audiences(config.allowed_resource_servers.clone())
            .with_leeway(config.jwt_leeway_secs);
        if config.introspection_endpoint.is_some() {
            validator = validator.with_introspection(
                Arc::clone(&server),
                config.introspection_fail_open,
                config.http_timeout(),
            );
        }

        info!(
            provider = %config.provider_name,
            resources = registry.len(),
            development_mode = config.development_mode,
            introspection = config.introspection_endpoint.is_some(),
            "OAuth 2.1 handler initialized"
        );

        Ok(Self {
            config,
            registry,
            tracker,
            validator,
            revocations,
            jwks,
            server,
            token_store,
            auditor,
        })
    }

    /// Build a production handler: HTTP authorization server and the
    /// DocAIche resource catalog
    ///
    /// # Errors
    ///
    /// Same as [`OAuth21Handler::new`]
    pub fn from_config(
        config: OAuth21Config,
        token_store: Arc<dyn TokenStore>,
        auditor: Arc<dyn SecurityAuditor>,
    ) -> AuthResult<Self> {
        let server: Arc<dyn AuthorizationServer> =
            Arc::new(HttpAuthorizationServer::from_config(&config)?);
        let registry = Arc::new(ResourceRegistry::docaiche_defaults()?);
        Self::new(config, registry, server, token_store, auditor)
    }

    fn validation_mode(
        config: &OAuth21Config,
        server: &Arc<dyn AuthorizationServer>,
    ) -> AuthResult<(ValidationMode, Option<Arc<JwksCache>>)> {
        if config.development_mode {
            #[cfg(feature = "dev-hs256")]
            {
                let secret = config
                    .jwt_secret
                    .as_deref()
                    .ok_or_else(|| AuthError::config("development_mode requires jwt_secret"))?;
                return Ok((ValidationMode::shared_secret(secret), None));
            }
            #[cfg(not(feature = "dev-hs256"))]
            return Err(AuthError::config(
                "development_mode requires a build with the dev-hs256 feature",
            ));
        }

        let cache = Arc::new(
            JwksCache::new(
                Arc::clone(server),
                Duration::from_secs(config.jwks_cache_ttl_secs),
                config.http_timeout(),
            )
            .with_min_refetch_interval(Duration::from_secs(
                config.jwks_min_refetch_interval_secs,
            )),
        );
        Ok((ValidationMode::Jwks(Arc::clone(&cache)), Some(cache)))
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &OAuth21Config {
        &self.config
    }

    /// Resource registry
    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Pending authorization requests
    #[must_use]
    pub const fn tracker(&self) -> &AuthorizationRequestTracker {
        &self.tracker
    }

    /// Revocation cache
    #[must_use]
    pub fn revocations(&self) -> &RevocationCache {
        &self.revocations
    }

    /// JWKS cache, absent in development mode
    #[must_use]
    pub fn jwks(&self) -> Option<&JwksCache> {
        self.jwks.as_deref()
    }

    /// Resources that require `scope`
    #[must_use]
    pub fn get_resources_for_scope(&self, scope: &str) -> Vec<&ResourceDefinition> {
        self.registry.get_resources_for_scope(scope)
    }

    /// Registered definitions along a resource URN, most specific first
    ///
    /// # Errors
    ///
    /// Returns `INVALID_RESOURCE_URN` for malformed or foreign URNs
    pub fn get_resource_hierarchy(&self, resource_urn: &str) -> AuthResult<Vec<&ResourceDefinition>> {
        self.registry.get_resource_hierarchy(resource_urn)
    }

    /// Drop expired pending requests
    pub fn purge_expired_requests(&self) -> usize {
        self.tracker.purge_expired()
    }

    async fn audit(&self, event: AuditEvent) {
        emit(&self.auditor, event.with_client_id(self.config.client_id.clone())).await;
    }

    fn check_resource_allowed(&self, resource: &str) -> AuthResult<()> {
        let allowed = &self.config.allowed_resource_servers;
        let permitted = allowed.is_empty()
            || allowed.iter().any(|server| {
                resource == server
                    || resource
                        .strip_prefix(server.as_str())
                        .is_some_and(|rest| rest.starts_with(':'))
            });
        if permitted {
            Ok(())
        } else {
            Err(AuthError::new(
                ErrorCode::ResourceNotAllowed,
                format!("resource {resource} is not an allowed resource server"),
            ))
        }
    }

    fn check_resources(&self, resources: &[String]) -> AuthResult<()> {
        for resource in resources {
            self.check_resource_allowed(resource)?;
            self.registry.validate(resource)?;
        }
        Ok(())
    }

    /// Start an authorization attempt
    ///
    /// No network I/O; the returned URL carries the PKCE challenge and the
    /// resource indicators.
    ///
    /// # Errors
    ///
    /// `MISSING_RESOURCE_INDICATOR`, `RESOURCE_NOT_ALLOWED`, registry
    /// validation errors and `DUPLICATE_STATE`
    #[instrument(skip_all, fields(client_id = %self.config.client_id))]
    pub async fn initiate_auth_flow(
        &self,
        redirect_uri: &str,
        scope: &str,
        resource_indicators: &[String],
        options: FlowOptions,
    ) -> AuthResult<AuthorizationFlow> {
        if self.config.require_resource_indicators && resource_indicators.is_empty() {
            return Err(AuthError::new(
                ErrorCode::MissingResourceIndicator,
                "at least one resource indicator is required",
            ));
        }
        self.check_resources(resource_indicators)?;

        let state = options.state.unwrap_or_else(generate_state);
        let (authorization_url, pkce) = self.tracker.begin(AuthorizationParams {
            client_id: self.config.client_id.clone(),
            redirect_uri: redirect_uri.to_owned(),
            scope: scope.to_owned(),
            resource_indicators: resource_indicators.to_vec(),
            state: Some(state.clone()),
            nonce: options.nonce,
        })?;

        self.audit(
            AuditEvent::new(
                audit_events::AUTH_FLOW_INITIATED,
                AuditSeverity::Low,
                "OAuth 2.1 authorization flow initiated",
            )
            .with_resource(resource_indicators.join(" "))
            .with_metadata(json!({
                "redirect_uri": redirect_uri,
                "scope": scope,
                "code_challenge_method": pkce.method,
            })),
        )
        .await;

        Ok(AuthorizationFlow {
            authorization_url,
            state,
            pkce,
        })
    }

    /// Complete the code flow: verify PKCE, exchange the code, validate and
    /// persist the token
    ///
    /// `resource_indicators` narrows the resources bound at initiation; when
    /// absent all bound resources are requested.
    ///
    /// # Errors
    ///
    /// `INVALID_STATE` for an unknown, consumed or expired state; every other
    /// failure surfaces as `OAUTH_AUTH_FAILED` with the cause attached
    #[instrument(skip_all, fields(client_id = %self.config.client_id))]
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        resource_indicators: Option<&[String]>,
    ) -> AuthResult<AuthToken> {
        match self.claim_and_exchange(credentials, resource_indicators).await {
            Ok(token) => Ok(token),
            Err(error) => {
                self.audit(
                    AuditEvent::new(
                        audit_events::AUTH_FAILURE,
                        AuditSeverity::High,
                        "OAuth 2.1 authentication failed",
                    )
                    .with_metadata(error.audit_detail()),
                )
                .await;
                if error.is(ErrorCode::InvalidState) {
                    Err(error)
                } else {
                    Err(AuthError::new(
                        ErrorCode::OauthAuthFailed,
                        "authorization code flow failed",
                    )
                    .with_source(error))
                }
            }
        }
    }

    async fn claim_and_exchange(
        &self,
        credentials: &Credentials,
        resource_indicators: Option<&[String]>,
    ) -> AuthResult<AuthToken> {
        let guard = self.tracker.claim(&credentials.state)?;
        let outcome = self
            .exchange_claimed(guard.pending()?, credentials, resource_indicators)
            .await;
        match outcome {
            Ok(issued) => {
                // the token is persisted; nothing may put the request back now
                guard.commit();
                self.audit(
                    AuditEvent::new(
                        audit_events::AUTH_SUCCESS,
                        AuditSeverity::Low,
                        "OAuth 2.1 authentication succeeded",
                    )
                    .with_resource(issued.resources.join(" "))
                    .with_metadata(json!({
                        "token_id": issued.token.token_id,
                        "subject": issued.subject,
                        "scope": issued.token.scope,
                    })),
                )
                .await;
                info!(token_id = %issued.token.token_id, "Access token issued");
                Ok(issued.token)
            }
            Err(ExchangeFailure::Transient(error)) => {
                debug!("Transient exchange failure; pending request restored");
                guard.release();
                Err(error)
            }
            Err(ExchangeFailure::Definitive(error)) => {
                guard.commit();
                Err(error)
            }
        }
    }

    async fn exchange_claimed(
        &self,
        pending: &PendingAuthorization,
        credentials: &Credentials,
        resource_indicators: Option<&[String]>,
    ) -> Result<IssuedToken, ExchangeFailure> {
        use ExchangeFailure::{Definitive, Transient};

        if self.config.require_pkce || !credentials.code_verifier.is_empty() {
            pending
                .pkce
                .verify_verifier(&credentials.code_verifier)
                .map_err(Definitive)?;
        }

        let bound = &pending.request.resource_indicators;
        let resources = match resource_indicators {
            Some(requested) => {
                if let Some(extra) = requested.iter().find(|r| !bound.contains(r)) {
                    return Err(Definitive(AuthError::new(
                        ErrorCode::ResourceNotAllowed,
                        format!("resource {extra} was not bound at initiation"),
                    )));
                }
                requested.to_vec()
            }
            None => bound.clone(),
        };

        let exchange = CodeExchange {
            code: credentials.code.clone(),
            redirect_uri: pending.request.redirect_uri.clone(),
            code_verifier: credentials.code_verifier.clone(),
            resources: resources.clone(),
        };
        let response = self
            .remote_call(self.server.exchange_code(&exchange))
            .await
            .map_err(|e| {
                if e.is_transient() {
                    Transient(remote_unavailable("token exchange", e))
                } else {
                    Definitive(
                        AuthError::new(
                            ErrorCode::OauthAuthFailed,
                            "authorization server rejected the code exchange",
                        )
                        .with_source(e),
                    )
                }
            })?;

        let claims = self
            .validator
            .check(&response.access_token, None, &resources)
            .await
            .map_err(Definitive)?;
        let token = self
            .build_token(
                response,
                &claims,
                &resources,
                &pending.request.scope,
                None,
                grants::AUTHORIZATION_CODE,
            )
            .map_err(Definitive)?;

        self.token_store.store_token(&token).await.map_err(|e| {
            Definitive(AuthError::new(
                ErrorCode::OauthAuthFailed,
                format!("failed to persist issued token: {e}"),
            ))
        })?;

        Ok(IssuedToken {
            token,
            subject: claims.sub,
            resources,
        })
    }

    async fn remote_call<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        let timeout = self.config.http_timeout();
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout(timeout)))
    }

    fn build_token(
        &self,
        response: TokenResponse,
        claims: &AccessTokenClaims,
        resources: &[String],
        requested_scope: &str,
        previous_refresh_token: Option<&str>,
        grant_type: &str,
    ) -> AuthResult<AuthToken> {
        let scope = response
            .scope
            .clone()
            .or_else(|| claims.scope.clone())
            .unwrap_or_else(|| requested_scope.to_owned());
        let granted: Vec<&str> = scope.split_whitespace().collect();

        let mut resource_access = BTreeMap::new();
        for resource in resources {
            self.registry.validate_scope(resource, &granted, None)?;
            let definition = self.registry.validate(resource)?;
            resource_access.insert(resource.clone(), definition.allowed_operations.clone());
        }

        let lifetime = response
            .expires_in
            .unwrap_or(self.config.access_token_ttl_secs);
        let now = Utc::now();
        let expires_at = i64::try_from(lifetime)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(AuthToken {
            token_id: Uuid::new_v4().to_string(),
            client_id: self.config.client_id.clone(),
            refresh_token: response
                .refresh_token
                .or_else(|| previous_refresh_token.map(ToOwned::to_owned)),
            access_token: response.access_token,
            expires_at,
            scope,
            resource_access,
            token_type: response.token_type,
            metadata: json!({
                "provider": self.config.provider_name,
                "grant_type": grant_type,
                "subject": claims.sub,
                "issuer": claims.iss,
                "resource_indicators": resources,
            }),
        })
    }

    /// Validate an access token, returning the claims or the precise failure
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::check`]
    pub async fn check_token(
        &self,
        token: &str,
        required_scope: Option<&str>,
        required_resources: &[String],
    ) -> AuthResult<AccessTokenClaims> {
        self.validator
            .check(token, required_scope, required_resources)
            .await
    }

    /// Validate an access token for a protected call
    ///
    /// Failures are audited with their precise code and collapse to `false`.
    #[instrument(skip_all, fields(token = %short_fingerprint(token)))]
    pub async fn validate_token(
        &self,
        token: &str,
        required_scope: Option<&str>,
        required_resources: &[String],
    ) -> bool {
        match self.check_token(token, required_scope, required_resources).await {
            Ok(_) => true,
            Err(error) => {
                let severity = match (error.category(), error.code) {
                    (ErrorCategory::Security, _) => AuditSeverity::Critical,
                    (_, ErrorCode::InvalidSignature) => AuditSeverity::High,
                    _ => AuditSeverity::Medium,
                };
                self.audit(
                    AuditEvent::new(
                        audit_events::VALIDATION_FAILURE,
                        severity,
                        "Access token rejected",
                    )
                    .with_resource(required_resources.join(" "))
                    .with_metadata(json!({
                        "token": short_fingerprint(token),
                        "required_scope": required_scope,
                        "error": error.audit_detail(),
                    })),
                )
                .await;
                false
            }
        }
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The returned token supersedes the old one. It carries the old refresh
    /// token forward only when the server did not rotate it.
    ///
    /// # Errors
    ///
    /// Returns `REFRESH_FAILED` with the cause attached
    #[instrument(skip_all, fields(client_id = %self.config.client_id))]
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        resource_indicators: Option<&[String]>,
    ) -> AuthResult<AuthToken> {
        match self.refresh_inner(refresh_token, resource_indicators).await {
            Ok(token) => Ok(token),
            Err(error) => {
                self.audit(
                    AuditEvent::new(
                        audit_events::REFRESH_FAILURE,
                        AuditSeverity::High,
                        "Token refresh failed",
                    )
                    .with_metadata(json!({
                        "refresh_token": short_fingerprint(refresh_token),
                        "error": error.audit_detail(),
                    })),
                )
                .await;
                if error.is(ErrorCode::RefreshFailed) {
                    Err(error)
                } else {
                    Err(AuthError::new(
                        ErrorCode::RefreshFailed,
                        "token refresh failed",
                    )
                    .with_source(error))
                }
            }
        }
    }

    async fn refresh_inner(
        &self,
        refresh_token: &str,
        resource_indicators: Option<&[String]>,
    ) -> AuthResult<AuthToken> {
        if self.revocations.is_revoked(refresh_token) {
            return Err(AuthError::new(
                ErrorCode::RefreshFailed,
                "refresh token has been revoked",
            ));
        }
        let resources = resource_indicators.map(<[String]>::to_vec).unwrap_or_default();
        self.check_resources(&resources)?;

        let grant = RefreshGrant {
            refresh_token: refresh_token.to_owned(),
            resources: resources.clone(),
        };
        let response = self
            .remote_call(self.server.refresh(&grant))
            .await
            .map_err(|e| {
                AuthError::new(
                    ErrorCode::RefreshFailed,
                    "authorization server refused the refresh grant",
                )
                .with_source(e)
            })?;

        let claims = self
            .validator
            .check(&response.access_token, None, &resources)
            .await?;
        let rotated = response
            .refresh_token
            .as_deref()
            .is_some_and(|new| new != refresh_token);
        let token = self.build_token(
            response,
            &claims,
            &resources,
            "",
            Some(refresh_token),
            grants::REFRESH_TOKEN,
        )?;

        self.token_store.store_token(&token).await.map_err(|e| {
            AuthError::new(
                ErrorCode::RefreshFailed,
                format!("failed to persist refreshed token: {e}"),
            )
        })?;
        if rotated {
            // the server invalidated the old refresh token; refuse it locally too
            self.revocations.revoke(refresh_token);
        }

        self.audit(
            AuditEvent::new(
                audit_events::TOKEN_REFRESHED,
                AuditSeverity::Low,
                "Access token refreshed",
            )
            .with_resource(resources.join(" "))
            .with_metadata(json!({
                "token_id": token.token_id,
                "rotated": rotated,
            })),
        )
        .await;
        Ok(token)
    }

    /// Revoke a token
    ///
    /// The local effect is immediate and unconditional; the remote
    /// revocation endpoint is called best-effort and its failure is only
    /// logged. Returns `false` only for an empty token.
    #[instrument(skip_all, fields(token = %short_fingerprint(token)))]
    pub async fn revoke_token(&self, token: &str, token_type_hint: Option<&str>) -> bool {
        if token.is_empty() {
            return false;
        }
        let newly_revoked = self.revocations.revoke(token);

        let remote = if self.config.revocation_endpoint.is_some() {
            match self.remote_call(self.server.revoke(token, token_type_hint)).await {
                Ok(()) => "revoked",
                Err(e) => {
                    warn!(error = %e, "Remote revocation failed; token stays revoked locally");
                    "failed"
                }
            }
        } else {
            "not_configured"
        };

        self.audit(
            AuditEvent::new(
                audit_events::TOKEN_REVOKED,
                AuditSeverity::Low,
                "Token revoked",
            )
            .with_metadata(json!({
                "token": short_fingerprint(token),
                "token_type_hint": token_type_hint,
                "newly_revoked": newly_revoked,
                "remote": remote,
            })),
        )
        .await;
        true
    }

    /// Static capability description; no I/O
    #[must_use]
    pub fn get_provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.config.provider_name.clone(),
            oauth_version: "2.1".to_owned(),
            pkce_required: self.config.require_pkce,
            code_challenge_methods_supported: vec![pkce::METHOD_S256.to_owned()],
            resource_indicators_required: self.config.require_resource_indicators,
            refresh_token_rotation: self.config.refresh_token_rotation,
            grant_types_supported: vec![
                grants::AUTHORIZATION_CODE.to_owned(),
                grants::REFRESH_TOKEN.to_owned(),
            ],
            access_token_ttl_secs: self.config.access_token_ttl_secs,
            refresh_token_ttl_secs: self.config.refresh_token_ttl_secs,
            introspection_enabled: self.config.introspection_endpoint.is_some(),
            revocation_enabled: self.config.revocation_endpoint.is_some(),
            jwks_enabled: self.config.jwks_uri.is_some(),
            allowed_resource_servers: self.config.allowed_resource_servers.clone(),
            development_mode: self.config.development_mode,
        }
    }
}

fn remote_unavailable(operation: &str, error: RemoteError) -> AuthError {
    AuthError::new(
        ErrorCode::RemoteUnavailable,
        format!("{operation} did not complete"),
    )
    .with_source(error)
}
