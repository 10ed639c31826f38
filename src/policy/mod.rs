// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resource tagging, the policy decision point and its audit trail.

pub mod audit;
pub mod engine;
pub mod mfa;
pub mod tag;

pub use audit::{AuditEvent, AuditEventType, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use engine::{
    enforce_policy, Action, Decision, Obligation, PolicyConfig, PolicyDecision, PolicyEngine,
    PolicyInput, Reason,
};
pub use mfa::MfaEvidence;
pub use tag::{tag_resource, ResourceTag};
