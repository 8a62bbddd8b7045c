// ABOUTME: Process-lifetime set of revoked tokens consulted before any cryptographic validation
// ABOUTME: Keyed by SHA-256 fingerprint so raw tokens are never retained in memory
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::utils::fingerprint;

/// Append-only set of revoked token fingerprints
///
/// Entries live for the process lifetime. Growth is unbounded; deployments
/// with long uptimes should restart or cap revocations at the token store.
#[derive(Debug, Default)]
pub struct RevocationCache {
    revoked: DashMap<String, DateTime<Utc>>,
}

impl RevocationCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a token revoked; returns `false` if it already was
    pub fn revoke(&self, token: &str) -> bool {
        match self.revoked.entry(fingerprint(token)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                true
            }
        }
    }

    /// Whether a token was revoked
    #[must_use]
    pub fn is_revoked(&self, token: &str) -> bool {
        self.revoked.contains_key(&fingerprint(token))
    }

    /// When a token was revoked
    #[must_use]
    pub fn revoked_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.revoked.get(&fingerprint(token)).map(|entry| *entry)
    }

    /// Number of revoked tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Whether nothing has been revoked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoke_is_idempotent() {
        let cache = RevocationCache::new();
        assert!(cache.revoke("token-a"));
        assert!(!cache.revoke("token-a"));
        assert!(cache.is_revoked("token-a"));
        assert!(!cache.is_revoked("token-b"));
        assert_eq!(cache.len(), 1);
        assert!(cache.revoked_at("token-a").is_some());
    }

    #[test]
    fn test_revoking_again_keeps_first_timestamp() {
        let cache = RevocationCache::new();
        cache.revoke("token-a");
        let first = cache.revoked_at("token-a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(!cache.revoke("token-a"));
        assert_eq!(cache.revoked_at("token-a"), Some(first));
    }
}
