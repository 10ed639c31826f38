// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit records for policy decisions and account mutations.
//!
//! Records go to an injected [`AuditSink`]. The production sink writes one
//! `tracing` event per record on the `audit` target, which the subscriber
//! renders as JSON.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    #[serde(rename = "pdp.decision")]
    PolicyDecision,
    #[serde(rename = "bankaccount.provisioned")]
    AccountProvisioned,
    #[serde(rename = "bankaccount.claimed")]
    AccountClaimed,
    #[serde(rename = "bankaccount.linked")]
    AccountLinked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::PolicyDecision => "pdp.decision",
            AuditEventType::AccountProvisioned => "bankaccount.provisioned",
            AuditEventType::AccountClaimed => "bankaccount.claimed",
            AuditEventType::AccountLinked => "bankaccount.linked",
        }
    }
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Correlation id of the request.
    pub request_id: Option<String>,
    /// Subject that triggered the event (if known).
    pub actor: Option<String>,
    /// Affected bank account.
    pub resource_id: Option<String>,
    /// Event-specific fields.
    pub details: serde_json::Value,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            request_id: None,
            actor: None,
            resource_id: None,
            details: serde_json::Value::Null,
            success: true,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_actor(mut self, actor: Option<impl Into<String>>) -> Self {
        self.actor = actor.map(Into::into);
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Mark as a refusal (policy deny).
    pub fn denied(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Destination of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit records as `tracing` events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let details = serde_json::to_string(&event.details).unwrap_or_default();
        info!(
            target: "audit",
            event = event.event_type.as_str(),
            event_id = %event.event_id,
            request_id = event.request_id.as_deref().unwrap_or(""),
            actor = event.actor.as_deref().unwrap_or(""),
            resource_id = event.resource_id.as_deref().unwrap_or(""),
            success = event.success,
            details = %details,
            "{}",
            event.event_type.as_str()
        );
    }
}

/// Keeps records in memory; used by tests to assert on audit output.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
