// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy decision point.
//!
//! ## Rules (first match wins)
//!
//! 1. `azp` in the service allow-list: allow (`service_token`)
//! 2. A role in the admin bypass set: allow (`admin_bypass_role`)
//! 3. FINANCIAL write with step-up enabled: allow with MFA evidence, else
//!    deny `mfa_required_on_financial_write` with an `mfa` obligation
//! 4. FINANCIAL with a minimum device trust and a lower reported trust: deny
//!    `low_device_trust` with a `device_trust` obligation
//! 5. allow (`ok`)
//!
//! Every evaluation is audited, allow or deny.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use super::audit::{AuditEvent, AuditEventType, AuditSink};
use super::mfa::MfaEvidence;
use super::tag::ResourceTag;
use crate::context::{ContextError, RequestContext, Subject};
use crate::state::AppState;

/// PDP switches.
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    /// Client ids (`azp`) of trusted service accounts, lower-cased
    pub service_bypass_azp: Vec<String>,
    /// Roles allowed through unconditionally, lower-cased
    pub admin_bypass_roles: Vec<String>,
    /// Demand MFA on FINANCIAL writes
    pub require_mfa_for_financial_writes: bool,
    /// 0 disables the device-trust rule
    pub financial_min_device_trust: u8,
}

impl PolicyConfig {
    fn is_service_party(&self, azp: Option<&str>) -> bool {
        azp.map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .is_some_and(|a| self.service_bypass_azp.contains(&a))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}

impl Action {
    pub fn from_method(method: &Method) -> Self {
        if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
            Action::Read
        } else {
            Action::Write
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    ServiceToken,
    AdminBypassRole,
    Ok,
    MfaRequiredOnFinancialWrite,
    LowDeviceTrust,
}

/// What the caller must do before retrying a denied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Obligation {
    Mfa { acr_values: String },
    DeviceTrust { min: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reason: Reason,
    pub obligation: Option<Obligation>,
}

impl PolicyDecision {
    fn allow(reason: Reason) -> Self {
        Self {
            decision: Decision::Allow,
            reason,
            obligation: None,
        }
    }

    fn deny(reason: Reason, obligation: Obligation) -> Self {
        Self {
            decision: Decision::Deny,
            reason,
            obligation: Some(obligation),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// Everything a decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub subject: &'a Subject,
    pub context: &'a RequestContext,
    pub tag: ResourceTag,
    pub method: &'a Method,
    pub path: &'a str,
}

#[derive(Clone)]
pub struct PolicyEngine {
    config: PolicyConfig,
    sink: Arc<dyn AuditSink>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig, sink: Arc<dyn AuditSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decide and audit.
    pub fn evaluate(&self, input: &PolicyInput<'_>) -> PolicyDecision {
        let decision = self.decide(input);
        self.audit(input, &decision);
        decision
    }

    /// Pure rule evaluation.
    pub fn decide(&self, input: &PolicyInput<'_>) -> PolicyDecision {
        let action = Action::from_method(input.method);

        if self
            .config
            .is_service_party(input.context.authorized_party.as_deref())
        {
            return PolicyDecision::allow(Reason::ServiceToken);
        }

        if input
            .subject
            .roles
            .iter()
            .any(|r| self.config.admin_bypass_roles.contains(r))
        {
            return PolicyDecision::allow(Reason::AdminBypassRole);
        }

        if input.tag != ResourceTag::Financial {
            return PolicyDecision::allow(Reason::Ok);
        }

        if action == Action::Write && self.config.require_mfa_for_financial_writes {
            return if MfaEvidence::from_subject(input.subject).has_second_factor() {
                PolicyDecision::allow(Reason::Ok)
            } else {
                PolicyDecision::deny(
                    Reason::MfaRequiredOnFinancialWrite,
                    Obligation::Mfa {
                        acr_values: "mfa".to_string(),
                    },
                )
            };
        }

        let min = self.config.financial_min_device_trust;
        if min > 0 {
            if let Some(trust) = input.context.device_trust {
                if trust < min {
                    return PolicyDecision::deny(
                        Reason::LowDeviceTrust,
                        Obligation::DeviceTrust { min },
                    );
                }
            }
        }

        PolicyDecision::allow(Reason::Ok)
    }

    fn audit(&self, input: &PolicyInput<'_>, decision: &PolicyDecision) {
        let subject = input.subject;
        let context = input.context;
        let has_mfa = MfaEvidence::from_subject(subject).has_second_factor();
        let service = self
            .config
            .is_service_party(context.authorized_party.as_deref());

        let mut event = AuditEvent::new(AuditEventType::PolicyDecision)
            .with_request_id(context.request_id.clone())
            .with_actor(subject.external_id.clone())
            .with_details(json!({
                "roles": subject.roles,
                "agency_id": subject.agency_id,
                "action": Action::from_method(input.method),
                "sensitivity": input.tag,
                "risk": context.risk,
                "obligation": decision.obligation,
                "acr": subject.acr,
                "amr": subject.amr,
                "has_mfa": has_mfa,
                "hour": context.hour,
                "ip": context.caller_ip.map(|ip| ip.to_string()),
                "azp": context.authorized_party,
                "service": service,
                "decision": decision.decision,
                "reason": decision.reason,
                "path": input.path,
                "method": input.method.as_str(),
            }));
        if !decision.is_allow() {
            event = event.denied();
        }
        self.sink.record(event);
    }
}

/// 403 body of a policy denial.
#[derive(Debug, Serialize)]
pub struct PolicyDenied {
    pub error: &'static str,
    pub reason: Reason,
    pub obligation: Option<Obligation>,
}

impl From<PolicyDecision> for PolicyDenied {
    fn from(decision: PolicyDecision) -> Self {
        Self {
            error: "Forbidden",
            reason: decision.reason,
            obligation: decision.obligation,
        }
    }
}

impl IntoResponse for PolicyDenied {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(self)).into_response()
    }
}

/// PDP middleware; runs after the context builder and the resource tagger.
pub async fn enforce_policy(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let extensions = request.extensions();
    let (Some(subject), Some(context)) = (
        extensions.get::<Subject>(),
        extensions.get::<RequestContext>(),
    ) else {
        return ContextError::MissingClaims.into_response();
    };

    let input = PolicyInput {
        subject,
        context,
        tag: extensions.get::<ResourceTag>().copied().unwrap_or_default(),
        method: request.method(),
        path: request.uri().path(),
    };
    let decision = state.policy.evaluate(&input);

    if decision.is_allow() {
        next.run(request).await
    } else {
        PolicyDenied::from(decision).into_response()
    }
}
