// ABOUTME: RFC 8707 resource indicator registry mapping resource URNs to scopes and operations
// ABOUTME: Validates URNs with hierarchical fallback and proves the scope subset a token holds for a resource
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! Resource indicator registry
//!
//! The registry is immutable once built. Lookups first try an exact match and
//! then walk the URN from most to least specific, so a token can be scoped to
//! `urn:docaiche:tool:search:v2` when only `urn:docaiche:tool:search` is
//! registered.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};

use docaiche_auth_core::constants::defaults;
use docaiche_auth_core::{AuthError, AuthResult, ErrorCode};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `urn:<namespace>:<rest>`
const URN_PATTERN: &str = r"^urn:[A-Za-z0-9][A-Za-z0-9-]{0,31}:[A-Za-z0-9._~%!$&'()*+,;=@-]+(:[A-Za-z0-9._~%!$&'()*+,;=@-]+)*$";

/// Advisory sensitivity of a resource, used by policy and audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Safe to expose to any authenticated agent
    Public,
    /// Deployment-internal tools
    Internal,
    /// Administrative or sensitive data
    Confidential,
}

impl Display for SecurityLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
        })
    }
}

/// A protected resource identified by URN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Resource URN, prefixed by the deployment base URN
    pub urn: String,
    /// Human readable name
    pub name: String,
    /// Description
    pub description: String,
    /// Scopes a token must carry to use this resource
    pub required_scopes: Vec<String>,
    /// Advisory sensitivity level
    pub security_level: SecurityLevel,
    /// Kind of resource (tool, documentation, admin)
    pub resource_type: String,
    /// Operations a token holder may perform
    pub allowed_operations: Vec<String>,
}

impl ResourceDefinition {
    /// Create a definition
    #[must_use]
    pub fn new(
        urn: impl Into<String>,
        name: impl Into<String>,
        resource_type: impl Into<String>,
        security_level: SecurityLevel,
    ) -> Self {
        Self {
            urn: urn.into(),
            name: name.into(),
            description: String::new(),
            required_scopes: Vec::new(),
            security_level,
            resource_type: resource_type.into(),
            allowed_operations: Vec::new(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the required scopes
    #[must_use]
    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.required_scopes = scopes.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    /// Set the allowed operations
    #[must_use]
    pub fn with_operations(mut self, operations: &[&str]) -> Self {
        self.allowed_operations = operations.iter().map(|s| (*s).to_owned()).collect();
        self
    }
}

/// Registry of protected resources
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    base_urn: String,
    resources: HashMap<String, ResourceDefinition>,
    urn_pattern: Regex,
}

impl ResourceRegistry {
    /// Build a registry under `base_urn`
    ///
    /// # Errors
    ///
    /// Returns `INVALID_RESOURCE_URN` if a definition's URN is malformed or
    /// outside the base namespace, and `CONFIG_INVALID` for duplicates
    pub fn new(
        base_urn: impl Into<String>,
        definitions: impl IntoIterator<Item = ResourceDefinition>,
    ) -> AuthResult<Self> {
        let urn_pattern = Regex::new(URN_PATTERN).map_err(|e| {
            AuthError::config("resource URN pattern failed to compile").with_source(e)
        })?;
        let mut registry = Self {
            base_urn: base_urn.into(),
            resources: HashMap::new(),
            urn_pattern,
        };

        for definition in definitions {
            registry.check_urn(&definition.urn)?;
            if registry.resources.contains_key(&definition.urn) {
                return Err(AuthError::config(format!(
                    "resource {} registered twice",
                    definition.urn
                )));
            }
            registry
                .resources
                .insert(definition.urn.clone(), definition);
        }
        Ok(registry)
    }

    /// The catalog shipped with a DocAIche deployment
    ///
    /// # Errors
    ///
    /// Only fails if the built-in catalog itself is inconsistent
    pub fn docaiche_defaults() -> AuthResult<Self> {
        let base = defaults::BASE_RESOURCE_URN;
        Self::new(
            base,
            [
                ResourceDefinition::new(
                    format!("{base}:tool:search"),
                    "Documentation search",
                    "tool",
                    SecurityLevel::Public,
                )
                .with_description("Semantic and keyword search across indexed documentation")
                .with_scopes(&["read"])
                .with_operations(&["search", "query"]),
                ResourceDefinition::new(
                    format!("{base}:tool:ingest"),
                    "Content ingestion",
                    "tool",
                    SecurityLevel::Internal,
                )
                .with_description("Queue repositories and pages for ingestion")
                .with_scopes(&["read", "write"])
                .with_operations(&["ingest", "update"]),
                ResourceDefinition::new(
                    format!("{base}:tool:feedback"),
                    "Search feedback",
                    "tool",
                    SecurityLevel::Internal,
                )
                .with_description("Submit relevance feedback on search results")
                .with_scopes(&["write"])
                .with_operations(&["submit"]),
                ResourceDefinition::new(
                    format!("{base}:tool:collections"),
                    "Collections",
                    "tool",
                    SecurityLevel::Public,
                )
                .with_description("List workspaces and technology collections")
                .with_scopes(&["read"])
                .with_operations(&["list", "get"]),
                ResourceDefinition::new(
                    format!("{base}:docs"),
                    "Documentation content",
                    "documentation",
                    SecurityLevel::Public,
                )
                .with_description("Raw documentation pages and metadata")
                .with_scopes(&["read"])
                .with_operations(&["read", "list"]),
                ResourceDefinition::new(
                    format!("{base}:admin"),
                    "Administration",
                    "admin",
                    SecurityLevel::Confidential,
                )
                .with_description("Configuration, cache purge and reindexing")
                .with_scopes(&["admin"])
                .with_operations(&["configure", "purge", "reindex"]),
            ],
        )
    }

    /// Base namespace every URN must start with
    #[must_use]
    pub fn base_urn(&self) -> &str {
        &self.base_urn
    }

    /// Exact lookup without fallback
    #[must_use]
    pub fn get(&self, urn: &str) -> Option<&ResourceDefinition> {
        self.resources.get(urn)
    }

    /// All definitions, sorted by URN
    #[must_use]
    pub fn resources(&self) -> Vec<&ResourceDefinition> {
        let mut all: Vec<_> = self.resources.values().collect();
        all.sort_by(|a, b| a.urn.cmp(&b.urn));
        all
    }

    /// Number of registered resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn check_urn(&self, urn: &str) -> AuthResult<()> {
        if !self.urn_pattern.is_match(urn) {
            return Err(AuthError::new(
                ErrorCode::InvalidResourceUrn,
                format!("'{urn}' does not match urn:<namespace>:<resource>"),
            ));
        }
        let in_namespace = urn
            .strip_prefix(&self.base_urn)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'));
        if !in_namespace {
            return Err(AuthError::new(
                ErrorCode::InvalidResourceUrn,
                format!("'{urn}' is outside {}", self.base_urn),
            ));
        }
        Ok(())
    }

    /// Resolve a URN to its definition, falling back to the nearest
    /// registered ancestor
    ///
    /// # Errors
    ///
    /// Returns `INVALID_RESOURCE_URN` for malformed or foreign URNs and
    /// `UNKNOWN_RESOURCE` when no ancestor is registered
    pub fn validate(&self, resource_urn: &str) -> AuthResult<&ResourceDefinition> {
        self.check_urn(resource_urn)?;

        let mut candidate = resource_urn;
        loop {
            if let Some(definition) = self.resources.get(candidate) {
                return Ok(definition);
            }
            match candidate.rfind(':') {
                // never walk above urn:<namespace>
                Some(idx) if candidate[..idx].contains(':') => candidate = &candidate[..idx],
                _ => break,
            }
        }
        Err(AuthError::new(
            ErrorCode::UnknownResource,
            format!("no resource registered for '{resource_urn}'"),
        ))
    }

    /// Prove which of the requested scopes apply to a resource
    ///
    /// Returns `requested ∩ required`: a token may carry broader scope than a
    /// resource needs, but only the intersection is granted for it.
    ///
    /// # Errors
    ///
    /// `validate` errors, `INSUFFICIENT_SCOPE` when a required scope is
    /// missing, `OPERATION_NOT_ALLOWED` when `operation` is not permitted
    pub fn validate_scope<S: AsRef<str>>(
        &self,
        resource_urn: &str,
        requested_scopes: &[S],
        operation: Option<&str>,
    ) -> AuthResult<BTreeSet<String>> {
        let definition = self.validate(resource_urn)?;
        let requested: BTreeSet<&str> = requested_scopes.iter().map(AsRef::as_ref).collect();

        let missing: Vec<String> = definition
            .required_scopes
            .iter()
            .filter(|scope| !requested.contains(scope.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(AuthError::insufficient_scope(resource_urn, &missing));
        }

        if let Some(operation) = operation {
            if !definition.allowed_operations.iter().any(|op| op == operation) {
                return Err(AuthError::new(
                    ErrorCode::OperationNotAllowed,
                    format!("operation '{operation}' is not allowed on {resource_urn}"),
                ));
            }
        }

        Ok(definition
            .required_scopes
            .iter()
            .filter(|scope| requested.contains(scope.as_str()))
            .cloned()
            .collect())
    }

    /// The `aud` value expected in tokens for a resource
    ///
    /// A sub-resource resolved through fallback keeps its own URN as audience.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceRegistry::validate`]
    pub fn audience_for(&self, resource_urn: &str) -> AuthResult<String> {
        self.validate(resource_urn)?;
        Ok(resource_urn.to_owned())
    }

    /// Resources that require `scope`, sorted by URN
    #[must_use]
    pub fn get_resources_for_scope(&self, scope: &str) -> Vec<&ResourceDefinition> {
        let mut matching: Vec<_> = self
            .resources
            .values()
            .filter(|definition| definition.required_scopes.iter().any(|s| s == scope))
            .collect();
        matching.sort_by(|a, b| a.urn.cmp(&b.urn));
        matching
    }

    /// Registered definitions along the URN path, most specific first
    ///
    /// # Errors
    ///
    /// Returns `INVALID_RESOURCE_URN` for malformed or foreign URNs
    pub fn get_resource_hierarchy(&self, resource_urn: &str) -> AuthResult<Vec<&ResourceDefinition>> {
        self.check_urn(resource_urn)?;
        let mut chain = Vec::new();
        let mut candidate = resource_urn;
        loop {
            if let Some(definition) = self.resources.get(candidate) {
                chain.push(definition);
            }
            match candidate.rfind(':') {
                Some(idx) if candidate[..idx].contains(':') => candidate = &candidate[..idx],
                _ => break,
            }
        }
        Ok(chain)
    }
}
