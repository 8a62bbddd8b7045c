// ABOUTME: Remote authorization server seam: token, introspection, revocation and JWKS endpoints
// ABOUTME: HttpAuthorizationServer is the production strategy; tests supply their own implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use std::time::Duration;

use async_trait::async_trait;
use docaiche_auth_core::constants::grants;
use docaiche_auth_core::{AuthError, AuthResult};
use reqwest::{Client, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::jwks::JsonWebKeySet;
use super::models::{IntrospectionResponse, TokenResponse};
use crate::config::OAuth21Config;
use crate::utils::http_client::oauth_client;

/// Failure talking to the authorization server
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No response within the allotted time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection, TLS or protocol failure before a response arrived
    #[error("transport failure: {0}")]
    Transport(String),
    /// Non-success HTTP status, with the RFC 6749 error body when present
    #[error("authorization server returned HTTP {status}: {}", .error.as_deref().unwrap_or("no error code"))]
    Status {
        /// HTTP status
        status: u16,
        /// RFC 6749 `error`
        error: Option<String>,
        /// RFC 6749 `error_description`
        description: Option<String>,
    },
    /// The response body could not be understood
    #[error("unexpected response body: {0}")]
    InvalidResponse(String),
    /// The endpoint is not configured for this deployment
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl RemoteError {
    /// Whether the exchange may not have completed server-side
    ///
    /// Timeouts, transport failures and 5xx responses are transient; a 4xx
    /// rejection is definitive.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse(_) | Self::NotConfigured(_) => false,
        }
    }

    /// RFC 6749 error code, if the server sent one
    #[must_use]
    pub fn oauth_error(&self) -> Option<&str> {
        match self {
            Self::Status { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}

/// Authorization-code grant parameters
#[derive(Clone)]
pub struct CodeExchange {
    /// Authorization code
    pub code: String,
    /// Redirect URI used at initiation
    pub redirect_uri: String,
    /// PKCE verifier
    pub code_verifier: String,
    /// Resource indicators (sent as repeated `resource` parameters)
    pub resources: Vec<String>,
}

impl std::fmt::Debug for CodeExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeExchange")
            .field("redirect_uri", &self.redirect_uri)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

/// Refresh grant parameters
#[derive(Clone)]
pub struct RefreshGrant {
    /// Refresh token presented by the client
    pub refresh_token: String,
    /// Resource indicators for the new access token
    pub resources: Vec<String>,
}

impl std::fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

/// Endpoints of the remote authorization server
#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    /// Exchange an authorization code at the token endpoint
    async fn exchange_code(&self, exchange: &CodeExchange) -> Result<TokenResponse, RemoteError>;

    /// Run the refresh grant at the token endpoint
    async fn refresh(&self, grant: &RefreshGrant) -> Result<TokenResponse, RemoteError>;

    /// RFC 7662 introspection
    async fn introspect(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> Result<IntrospectionResponse, RemoteError>;

    /// RFC 7009 revocation
    async fn revoke(&self, token: &str, token_type_hint: Option<&str>) -> Result<(), RemoteError>;

    /// Fetch the JWK Set
    async fn fetch_key_set(&self) -> Result<JsonWebKeySet, RemoteError>;
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authorization server reached over HTTPS with form-encoded requests
#[derive(Debug, Clone)]
pub struct HttpAuthorizationServer {
    client: Client,
    client_id: String,
    client_secret: Option<String>,
    token_endpoint: String,
    introspection_endpoint: Option<String>,
    revocation_endpoint: Option<String>,
    jwks_uri: Option<String>,
    timeout: Duration,
}

impl HttpAuthorizationServer {
    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` if the HTTP client cannot be built
    pub fn from_config(config: &OAuth21Config) -> AuthResult<Self> {
        let client = oauth_client(config.http_timeout_secs)
            .map_err(|e| AuthError::config("failed to build HTTP client").with_source(e))?;
        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_endpoint: config.token_endpoint.clone(),
            introspection_endpoint: config.introspection_endpoint.clone(),
            revocation_endpoint: config.revocation_endpoint.clone(),
            jwks_uri: config.jwks_uri.clone(),
            timeout: config.http_timeout(),
        })
    }

    fn client_credentials(&self, form: &mut Vec<(&'static str, String)>) {
        form.push(("client_id", self.client_id.clone()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }
    }

    async fn post_form(
        &self,
        endpoint: &str,
        form: &[(&'static str, String)],
    ) -> Result<Response, RemoteError> {
        let response = self
            .client
            .post(endpoint)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        check_status(response).await
    }

    fn transport_error(&self, error: &reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Transport(error.to_string())
        }
    }

    async fn token_request(
        &self,
        mut form: Vec<(&'static str, String)>,
        resources: &[String],
    ) -> Result<TokenResponse, RemoteError> {
        form.extend(resources.iter().map(|r| ("resource", r.clone())));
        self.client_credentials(&mut form);
        let response = self.post_form(&self.token_endpoint, &form).await?;
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<OAuthErrorBody>(&body).ok();
    warn!(
        status = status.as_u16(),
        error = parsed.as_ref().map(|b| b.error.as_str()),
        "Authorization server rejected request"
    );
    Err(RemoteError::Status {
        status: status.as_u16(),
        error: parsed.as_ref().map(|b| b.error.clone()),
        description: parsed.and_then(|b| b.error_description),
    })
}

#[async_trait]
impl AuthorizationServer for HttpAuthorizationServer {
    async fn exchange_code(&self, exchange: &CodeExchange) -> Result<TokenResponse, RemoteError> {
        debug!(endpoint = %self.token_endpoint, "Exchanging authorization code");
        let form = vec![
            ("grant_type", grants::AUTHORIZATION_CODE.to_owned()),
            ("code", exchange.code.clone()),
            ("redirect_uri", exchange.redirect_uri.clone()),
            ("code_verifier", exchange.code_verifier.clone()),
        ];
        self.token_request(form, &exchange.resources).await
    }

    async fn refresh(&self, grant: &RefreshGrant) -> Result<TokenResponse, RemoteError> {
        debug!(endpoint = %self.token_endpoint, "Refreshing access token");
        let form = vec![
            ("grant_type", grants::REFRESH_TOKEN.to_owned()),
            ("refresh_token", grant.refresh_token.clone()),
        ];
        self.token_request(form, &grant.resources).await
    }

    async fn introspect(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> Result<IntrospectionResponse, RemoteError> {
        let endpoint = self
            .introspection_endpoint
            .as_deref()
            .ok_or(RemoteError::NotConfigured("introspection_endpoint"))?;
        let mut form = vec![("token", token.to_owned())];
        if let Some(hint) = token_type_hint {
            form.push(("token_type_hint", hint.to_owned()));
        }
        self.client_credentials(&mut form);
        let response = self.post_form(endpoint, &form).await?;
        response
            .json::<IntrospectionResponse>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn revoke(&self, token: &str, token_type_hint: Option<&str>) -> Result<(), RemoteError> {
        let endpoint = self
            .revocation_endpoint
            .as_deref()
            .ok_or(RemoteError::NotConfigured("revocation_endpoint"))?;
        let mut form = vec![("token", token.to_owned())];
        if let Some(hint) = token_type_hint {
            form.push(("token_type_hint", hint.to_owned()));
        }
        self.client_credentials(&mut form);
        self.post_form(endpoint, &form).await?;
        Ok(())
    }

    async fn fetch_key_set(&self) -> Result<JsonWebKeySet, RemoteError> {
        let endpoint = self
            .jwks_uri
            .as_deref()
            .ok_or(RemoteError::NotConfigured("jwks_uri"))?;
        let response = self
            .client
            .get(endpoint)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        check_status(response)
            .await?
            .json::<JsonWebKeySet>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}
