// ABOUTME: Utility modules shared across the authorization subsystem
// ABOUTME: HTTP client construction and token fingerprinting helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

/// HTTP client configuration and helpers
pub mod http_client;

use sha2::{Digest, Sha256};

/// Stable, non-reversible identifier for a token or secret
///
/// Used as the revocation key and wherever a token must be referred to in
/// logs. The raw value never leaves this function.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Short fingerprint prefix for log lines
#[must_use]
pub fn short_fingerprint(secret: &str) -> String {
    let mut digest = fingerprint(secret);
    digest.truncate(12);
    digest
}
