// ABOUTME: Token store seam receiving every AuthToken this subsystem issues
// ABOUTME: Includes an in-memory DashMap adapter for single-process deployments and tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use super::models::AuthToken;

/// Durable storage of issued tokens, owned outside this subsystem
///
/// Write-only from here: validation never reads the store back.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a newly issued token
    ///
    /// # Errors
    ///
    /// Returns an error if the token could not be stored
    async fn store_token(&self, token: &AuthToken) -> Result<()>;
}

/// Token store keeping tokens in process memory, keyed by `token_id`
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<String, AuthToken>,
}

impl InMemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored token
    #[must_use]
    pub fn get(&self, token_id: &str) -> Option<AuthToken> {
        self.tokens.get(token_id).map(|entry| entry.clone())
    }

    /// Number of stored tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn store_token(&self, token: &AuthToken) -> Result<()> {
        self.tokens.insert(token.token_id.clone(), token.clone());
        Ok(())
    }
}
