// ABOUTME: Security module for audit trails of authorization events
// ABOUTME: Re-exports the auditor seam and its tracing adapter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 DocAIche

/// Security audit events and sinks
pub mod audit;

pub use audit::{AuditEvent, AuditSeverity, SecurityAuditor, TracingAuditor};
