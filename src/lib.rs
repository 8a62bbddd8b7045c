// ABOUTME: Main library entry point for the DocAIche OAuth 2.1 authorization subsystem
// ABOUTME: Gates agent-facing operations with PKCE code flow, resource indicators and JWKS-verified tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

#![deny(unsafe_code)]

//! # DocAIche Auth
//!
//! OAuth 2.1 authorization for automated and agent callers of DocAIche
//! tools.
//!
//! ## Features
//!
//! - **PKCE**: S256 only, verified in constant time
//! - **Resource indicators** (RFC 8707): URN registry with hierarchical fallback
//! - **JWT validation**: RS256 against a cached, rotating JWK Set
//! - **Token lifecycle**: refresh with optional rotation, local-first revocation, introspection
//!
//! ## Architecture
//!
//! - **`oauth21`**: the authorization components and the `OAuth21Handler` orchestrator
//! - **`config`**: environment-driven configuration with strict validation
//! - **`security`**: audit events and the auditor seam
//! - **`logging`**: structured `tracing` setup
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docaiche_auth::config::OAuth21Config;
//! use docaiche_auth::oauth21::{FlowOptions, InMemoryTokenStore, OAuth21Handler};
//! use docaiche_auth::security::TracingAuditor;
//!
//! # async fn example() -> docaiche_auth::AuthResult<()> {
//! let config = OAuth21Config::from_env()?;
//! let handler = OAuth21Handler::from_config(
//!     config,
//!     Arc::new(InMemoryTokenStore::new()),
//!     Arc::new(TracingAuditor::new()),
//! )?;
//!
//! let flow = handler
//!     .initiate_auth_flow(
//!         "https://app.example/callback",
//!         "read",
//!         &["urn:docaiche:tool:search".to_owned()],
//!         FlowOptions::default(),
//!     )
//!     .await?;
//! println!("redirect to {}", flow.authorization_url);
//! # Ok(())
//! # }
//! ```

/// Configuration management
pub mod config;

/// Structured logging setup
pub mod logging;

/// OAuth 2.1 authorization components
pub mod oauth21;

/// Security auditing
pub mod security;

/// Shared helpers
pub mod utils;

pub use docaiche_auth_core::{AuthError, AuthResult, ErrorCategory, ErrorCode};
