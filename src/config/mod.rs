// ABOUTME: Configuration module for the OAuth 2.1 authorization subsystem
// ABOUTME: Environment-driven handler configuration with strict validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

/// OAuth 2.1 handler configuration
pub mod oauth;

pub use oauth::OAuth21Config;
