// ABOUTME: Core types and constants for the DocAIche OAuth 2.1 authorization subsystem
// ABOUTME: Foundation crate with the error taxonomy and protocol constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

#![deny(unsafe_code)]

//! # DocAIche Auth Core
//!
//! Foundation crate shared by the authorization library and its tooling.
//! It changes rarely, which keeps incremental builds of the workspace cheap.
//!
//! ## Modules
//!
//! - **errors**: `AuthError`, `ErrorCode` and `ErrorCategory`
//! - **constants**: PKCE parameters, defaults, grant types, audit event names

/// Error taxonomy with stable machine-readable codes
pub mod errors;

/// Protocol constants and defaults organized by domain
pub mod constants;

pub use errors::{AuthError, AuthResult, ErrorCategory, ErrorCode};
