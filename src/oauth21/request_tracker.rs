// ABOUTME: Tracks pending authorization requests keyed by state with single-use atomic consumption
// ABOUTME: Builds authorization URLs and hands out claim guards that restore the entry on cancellation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use docaiche_auth_core::constants::{defaults, grants};
use docaiche_auth_core::{AuthError, AuthResult, ErrorCode};
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};
use url::Url;

use super::models::AuthorizationRequest;
use super::pkce::PkceChallenge;
use super::resources::ResourceRegistry;

/// Parameters for starting an authorization attempt
#[derive(Debug, Clone, Default)]
pub struct AuthorizationParams {
    /// Client to authorize
    pub client_id: String,
    /// Redirect URI registered with the authorization server
    pub redirect_uri: String,
    /// Space-separated scope
    pub scope: String,
    /// Resource URNs the token should be scoped to
    pub resource_indicators: Vec<String>,
    /// Caller-chosen state; generated when absent
    pub state: Option<String>,
    /// OpenID nonce forwarded to the authorization server
    pub nonce: Option<String>,
}

/// A pending request together with its PKCE pair
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// The bound request parameters
    pub request: AuthorizationRequest,
    /// The challenge issued for this attempt
    pub pkce: PkceChallenge,
}

/// Process-scoped store of pending authorization attempts
#[derive(Debug)]
pub struct AuthorizationRequestTracker {
    registry: Arc<ResourceRegistry>,
    authorization_endpoint: Url,
    pending: DashMap<String, PendingAuthorization>,
    request_max_age: Duration,
    pkce_max_age: Duration,
}

impl AuthorizationRequestTracker {
    /// Create a tracker issuing URLs against `authorization_endpoint`
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_INVALID` if the endpoint is not an absolute URL
    pub fn new(
        registry: Arc<ResourceRegistry>,
        authorization_endpoint: &str,
        request_max_age_secs: u64,
        pkce_max_age_secs: u64,
    ) -> AuthResult<Self> {
        let authorization_endpoint = Url::parse(authorization_endpoint).map_err(|e| {
            AuthError::config("authorization_endpoint is not a valid URL").with_source(e)
        })?;
        Ok(Self {
            registry,
            authorization_endpoint,
            pending: DashMap::new(),
            request_max_age: seconds(request_max_age_secs),
            pkce_max_age: seconds(pkce_max_age_secs),
        })
    }

    /// Start an attempt and return the authorization URL with its PKCE pair
    ///
    /// # Errors
    ///
    /// Registry validation errors for any resource indicator, and
    /// `DUPLICATE_STATE` if a caller-provided state is already pending
    pub fn begin(&self, params: AuthorizationParams) -> AuthResult<(String, PkceChallenge)> {
        self.purge_expired();

        for resource in &params.resource_indicators {
            self.registry.validate(resource)?;
        }

        let state = match params.state {
            Some(state) if state.trim().is_empty() => {
                return Err(AuthError::invalid_state("state must not be empty"));
            }
            Some(state) => state,
            None => generate_state(),
        };
        let pkce = PkceChallenge::generate();

        let request = AuthorizationRequest {
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            response_type: grants::RESPONSE_TYPE_CODE.to_owned(),
            scope: params.scope,
            state: state.clone(),
            code_challenge: pkce.challenge.clone(),
            code_challenge_method: pkce.method.clone(),
            resource_indicators: params.resource_indicators,
            nonce: params.nonce,
            created_at: Utc::now(),
        };
        let url = self.authorization_url(&request);

        match self.pending.entry(state) {
            Entry::Occupied(_) => Err(AuthError::new(
                ErrorCode::DuplicateState,
                "state is already bound to a pending authorization request",
            )),
            Entry::Vacant(slot) => {
                debug!(
                    client_id = %request.client_id,
                    resources = ?request.resource_indicators,
                    "Authorization request pending"
                );
                slot.insert(PendingAuthorization {
                    request,
                    pkce: pkce.clone(),
                });
                Ok((url, pkce))
            }
        }
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> String {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &request.client_id)
                .append_pair("redirect_uri", &request.redirect_uri)
                .append_pair("response_type", &request.response_type)
                .append_pair("scope", &request.scope)
                .append_pair("state", &request.state)
                .append_pair("code_challenge", &request.code_challenge)
                .append_pair("code_challenge_method", &request.code_challenge_method);
            if !request.resource_indicators.is_empty() {
                query.append_pair("resource", &request.resource_indicators.join(" "));
            }
            if let Some(nonce) = &request.nonce {
                query.append_pair("nonce", nonce);
            }
        }
        url.into()
    }

    /// Atomically remove and return the pending request for `state`
    ///
    /// # Errors
    ///
    /// Returns `INVALID_STATE` if the state is unknown, already consumed or
    /// expired
    pub fn consume(&self, state: &str) -> AuthResult<PendingAuthorization> {
        let (_, pending) = self
            .pending
            .remove(state)
            .ok_or_else(|| AuthError::invalid_state("unknown or already consumed state"))?;
        if self.is_expired(&pending) {
            return Err(AuthError::invalid_state("authorization request expired"));
        }
        Ok(pending)
    }

    /// Claim the pending request for the duration of a code exchange
    ///
    /// The entry leaves the map immediately, so a concurrent claim for the
    /// same state fails. Dropping the guard without [`ClaimGuard::commit`]
    /// puts the entry back.
    ///
    /// # Errors
    ///
    /// Same as [`AuthorizationRequestTracker::consume`]
    pub fn claim(&self, state: &str) -> AuthResult<ClaimGuard<'_>> {
        let pending = self.consume(state)?;
        Ok(ClaimGuard {
            pending: &self.pending,
            entry: Some((state.to_owned(), pending)),
        })
    }

    /// Drop requests older than their max age; returns how many were purged
    pub fn purge_expired(&self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| !self.is_expired(pending));
        let purged = before.saturating_sub(self.pending.len());
        if purged > 0 {
            debug!(purged, "Purged expired authorization requests");
        }
        purged
    }

    /// Number of requests currently pending
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `state` is currently pending
    #[must_use]
    pub fn is_pending(&self, state: &str) -> bool {
        self.pending.contains_key(state)
    }

    fn is_expired(&self, pending: &PendingAuthorization) -> bool {
        Utc::now() - pending.request.created_at > self.request_max_age
            || pending.pkce.is_expired(self.pkce_max_age)
    }
}

/// Exclusive hold on a pending request during `authenticate`
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    pending: &'a DashMap<String, PendingAuthorization>,
    entry: Option<(String, PendingAuthorization)>,
}

impl ClaimGuard<'_> {
    /// The claimed request
    ///
    /// # Errors
    ///
    /// Returns `INVALID_STATE` if the guard was already resolved
    pub fn pending(&self) -> AuthResult<&PendingAuthorization> {
        self.entry
            .as_ref()
            .map(|(_, pending)| pending)
            .ok_or_else(|| AuthError::invalid_state("claim already resolved"))
    }

    /// The request is finished with; it is not restored
    pub fn commit(mut self) {
        self.entry = None;
    }

    /// Put the request back so the callback can be retried
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if let Some((state, pending)) = self.entry.take() {
            match self.pending.entry(state) {
                Entry::Vacant(slot) => {
                    slot.insert(pending);
                }
                Entry::Occupied(_) => {
                    warn!("State was re-bound while claimed; dropping the claimed request");
                }
            }
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Random unpadded base64url state value
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0_u8; defaults::STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
