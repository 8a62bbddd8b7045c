// ABOUTME: Security audit events for the OAuth 2.1 token lifecycle
// ABOUTME: Defines the SecurityAuditor sink seam and a tracing-backed adapter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

//! # Security Audit Module
//!
//! Audit events for authentication flows, refresh, revocation and token
//! validation failures. Delivery is fire-and-forget: the orchestrator logs a
//! failed delivery and carries on with the primary operation.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Routine lifecycle events
    Low,
    /// Expected failures such as rejected tokens
    Medium,
    /// Failed authentication attempts
    High,
    /// Signals of infrastructure misconfiguration or attack
    Critical,
}

impl AuditSeverity {
    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Display for AuditSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier
    pub event_id: Uuid,
    /// Event type name, see `docaiche_auth_core::constants::audit_events`
    pub event_type: String,
    /// Severity level
    pub severity: AuditSeverity,
    /// Timestamp of the event
    pub timestamp: DateTime<Utc>,
    /// OAuth client the event concerns
    pub client_id: Option<String>,
    /// Resource URN(s) the event concerns
    pub resource: Option<String>,
    /// Event description
    pub description: String,
    /// Additional event metadata
    pub metadata: Value,
}

impl AuditEvent {
    /// Create a new audit event
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        severity: AuditSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            severity,
            timestamp: Utc::now(),
            client_id: None,
            resource: None,
            description: description.into(),
            metadata: Value::Null,
        }
    }

    /// Set the client the event concerns
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set resource affected
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Add metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sink for security audit events
///
/// Implementations may forward to a SIEM, a database or a log pipeline.
#[async_trait]
pub trait SecurityAuditor: Send + Sync {
    /// Record an audit event
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be delivered
    async fn log_event(&self, event: AuditEvent) -> Result<()>;
}

/// Deliver an event, logging and swallowing sink failures
pub async fn emit(auditor: &Arc<dyn SecurityAuditor>, event: AuditEvent) {
    let event_id = event.event_id;
    let event_type = event.event_type.clone();
    if let Err(e) = auditor.log_event(event).await {
        warn!(
            %event_id,
            %event_type,
            error = %e,
            "Failed to deliver security audit event"
        );
    }
}

/// Audit sink writing structured `tracing` records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditor;

impl TracingAuditor {
    /// Create a tracing-backed auditor
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecurityAuditor for TracingAuditor {
    async fn log_event(&self, event: AuditEvent) -> Result<()> {
        match event.severity {
            AuditSeverity::Low => {
                info!(
                    target: "security_audit",
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    client_id = ?event.client_id,
                    resource = ?event.resource,
                    metadata = %event.metadata,
                    "Security audit event: {}",
                    event.description
                );
            }
            AuditSeverity::Medium => {
                warn!(
                    target: "security_audit",
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    client_id = ?event.client_id,
                    resource = ?event.resource,
                    metadata = %event.metadata,
                    "Security audit warning: {}",
                    event.description
                );
            }
            AuditSeverity::High => {
                error!(
                    target: "security_audit",
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    client_id = ?event.client_id,
                    resource = ?event.resource,
                    metadata = %event.metadata,
                    "Security audit error: {}",
                    event.description
                );
            }
            AuditSeverity::Critical => {
                error!(
                    target: "security_alert",
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    client_id = ?event.client_id,
                    resource = ?event.resource,
                    metadata = %event.metadata,
                    "SECURITY ALERT: {}",
                    event.description
                );
            }
        }
        debug!(event_id = %event.event_id, "Audit event recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingAuditor(AtomicUsize);

    #[async_trait]
    impl SecurityAuditor for FailingAuditor {
        async fn log_event(&self, _event: AuditEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("sink offline")
        }
    }

    #[test]
    fn test_builder_sets_fields() {
        let event = AuditEvent::new("oauth_token_revoked", AuditSeverity::Low, "revoked")
            .with_client_id("agent")
            .with_resource("urn:docaiche:tool:search")
            .with_metadata(serde_json::json!({"hint": "access_token"}));

        assert_eq!(event.client_id.as_deref(), Some("agent"));
        assert_eq!(event.resource.as_deref(), Some("urn:docaiche:tool:search"));
        assert_eq!(event.metadata["hint"], "access_token");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AuditSeverity::Critical > AuditSeverity::High);
        assert!(AuditSeverity::Medium > AuditSeverity::Low);
        assert_eq!(AuditSeverity::High.to_string(), "high");
    }

    #[tokio::test]
    async fn test_emit_swallows_sink_failure() {
        let failing = Arc::new(FailingAuditor(AtomicUsize::new(0)));
        let auditor: Arc<dyn SecurityAuditor> = failing.clone();
        emit(&auditor, AuditEvent::new("x", AuditSeverity::High, "boom")).await;
        assert_eq!(failing.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tracing_auditor_accepts_every_severity() {
        let auditor = TracingAuditor::new();
        for severity in [
            AuditSeverity::Low,
            AuditSeverity::Medium,
            AuditSeverity::High,
            AuditSeverity::Critical,
        ] {
            assert!(auditor
                .log_event(AuditEvent::new("test", severity, "event"))
                .await
                .is_ok());
        }
    }
}
