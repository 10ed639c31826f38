// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Security context of a request.
//!
//! The context builder projects verified claims plus a few request facts
//! (correlation id, debug hour, caller IP) into a [`Subject`] and a
//! [`RequestContext`]. Both are inserted into the request extensions once and
//! only read afterwards.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, Timelike};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::VerifiedClaims;
use crate::clock::Clock;
use crate::state::AppState;

/// Correlation header, assigned by the outermost layer and echoed back.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Wall-clock hour override, honoured outside production only.
pub const X_DEBUG_HOUR: HeaderName = HeaderName::from_static("x-debug-hour");

/// Who is calling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Keycloak `sub`
    pub external_id: Option<String>,
    /// Lower-cased, deduplicated, first-seen order
    pub roles: Vec<String>,
    pub agency_id: Option<String>,
    pub acr: Vec<String>,
    pub amr: Vec<String>,
}

impl Subject {
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.roles.iter().any(|r| roles.contains(&r.as_str()))
    }
}

/// Per-request facts the policy looks at besides the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub request_id: String,
    /// 0..=23
    pub hour: u8,
    /// 0..=100
    pub device_trust: Option<u8>,
    pub risk: i64,
    pub caller_ip: Option<IpAddr>,
    /// Client the token was issued to (`azp`)
    pub authorized_party: Option<String>,
}

impl RequestContext {
    /// Minimal context, for callers that only need a correlation id.
    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            hour: 0,
            device_trust: None,
            risk: 0,
            caller_ip: None,
            authorized_party: None,
        }
    }
}

/// Raw request inputs to the context builder.
#[derive(Debug, Clone, Default)]
pub struct RequestFacts {
    pub request_id: Option<String>,
    pub debug_hour: Option<String>,
    pub caller_ip: Option<IpAddr>,
}

impl RequestFacts {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            request_id: header(&X_REQUEST_ID),
            debug_hour: header(&X_DEBUG_HOUR),
            caller_ip: None,
        }
    }

    pub fn from_request(request: &Request) -> Self {
        let mut facts = Self::from_headers(request.headers());
        facts.caller_ip = caller_ip(request);
        facts
    }
}

/// Peer address recorded by `into_make_service_with_connect_info`.
pub fn caller_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The context stage ran without a verified token in front of it.
    #[error("Missing token claims")]
    MissingClaims,
}

impl IntoResponse for ContextError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": "unauthorized",
            "message": self.to_string(),
        }));
        (axum::http::StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Builds the subject and request context.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    clock: Arc<dyn Clock>,
    honour_debug_hour: bool,
}

impl ContextBuilder {
    pub fn new(clock: Arc<dyn Clock>, honour_debug_hour: bool) -> Self {
        Self {
            clock,
            honour_debug_hour,
        }
    }

    pub fn build(
        &self,
        claims: Option<&VerifiedClaims>,
        facts: &RequestFacts,
    ) -> Result<(Subject, RequestContext), ContextError> {
        let verified = claims.ok_or(ContextError::MissingClaims)?;
        let claims = &verified.claims;

        let subject = Subject {
            external_id: claims.sub.clone().filter(|s| !s.is_empty()),
            roles: verified.roles.clone(),
            agency_id: claims.agency_id.clone(),
            acr: claims.acr.0.clone(),
            amr: claims.amr.0.clone(),
        };

        let context = RequestContext {
            request_id: facts
                .request_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            hour: self.hour(facts.debug_hour.as_deref()),
            device_trust: claims.device_trust.map(|t| t.clamp(0, 100) as u8),
            risk: claims.risk.unwrap_or(0),
            caller_ip: facts.caller_ip,
            authorized_party: claims.azp.clone().filter(|s| !s.is_empty()),
        };

        Ok((subject, context))
    }

    fn hour(&self, debug_hour: Option<&str>) -> u8 {
        if self.honour_debug_hour {
            if let Some(hour) = debug_hour.and_then(|h| h.parse::<i64>().ok()) {
                return hour.clamp(0, 23) as u8;
            }
        }
        self.clock.now().with_timezone(&Local).hour() as u8
    }
}

/// Context middleware; runs after [`crate::auth::authenticate`].
pub async fn enrich_context(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let facts = RequestFacts::from_request(&request);
    let built = state
        .context
        .build(request.extensions().get::<VerifiedClaims>(), &facts);

    match built {
        Ok((subject, context)) => {
            request.extensions_mut().insert(subject);
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
