// ABOUTME: HTTP client construction for authorization server calls with bounded timeouts
// ABOUTME: Builds rustls-backed reqwest clients so every token, JWKS and revocation call is time-limited
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use std::time::Duration;

use reqwest::{redirect::Policy, Client, ClientBuilder};

/// Connect timeout never exceeds this, whatever the request timeout
const MAX_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Create a client for authorization server calls
///
/// Redirects are not followed; a redirecting endpoint surfaces as a non-success status.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised
pub fn oauth_client(timeout_secs: u64) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(
            timeout_secs.clamp(1, MAX_CONNECT_TIMEOUT_SECS),
        ))
        .redirect(Policy::none())
        .user_agent(concat!("docaiche-auth/", env!("CARGO_PKG_VERSION")))
        .build()
}
