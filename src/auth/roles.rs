// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role names and the route-group role gate.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::info;

use super::{AuthError, VerifiedClaims};
use crate::context::Subject;

pub const ADMIN: &str = "admin";
pub const AGENT_KYC: &str = "agent_kyc";
pub const CLIENT_BANCAIRE: &str = "client_bancaire";
pub const CLIENT_NON_BANCAIRE: &str = "client_non_bancaire";
pub const SVC_BANKACCOUNT: &str = "svc_bankaccount";

/// Back-office roles whose writes are confined to their own agency.
pub const AGENCY_SCOPED: [&str; 3] = ["directeur_agence", "gfc", "agi"];

/// Any-of role requirement for a route group.
#[derive(Debug, Clone)]
pub struct RequiredRoles(Arc<[String]>);

impl RequiredRoles {
    pub fn any_of(roles: &[&str]) -> Self {
        Self(
            roles
                .iter()
                .map(|r| r.trim().to_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// `roles` must already be lower-cased.
    pub fn is_satisfied_by(&self, roles: &[String]) -> bool {
        self.0.iter().any(|required| roles.contains(required))
    }
}

/// Role gate middleware, used with
/// `from_fn_with_state(RequiredRoles::any_of(..), require_any_role)`.
///
/// Reads the roles of the [`Subject`] when the context builder ran, else
/// the verified claims (internal routes skip the context stage).
pub async fn require_any_role(
    State(required): State<RequiredRoles>,
    request: Request,
    next: Next,
) -> Response {
    let extensions = request.extensions();
    let roles = extensions
        .get::<Subject>()
        .map(|s| s.roles.as_slice())
        .or_else(|| extensions.get::<VerifiedClaims>().map(|c| c.roles.as_slice()))
        .unwrap_or_default();

    if required.is_satisfied_by(roles) {
        return next.run(request).await;
    }

    info!(
        required = ?required.as_slice(),
        path = %request.uri().path(),
        "Role gate denied request"
    );
    AuthError::MissingRole {
        required: required.as_slice().to_vec(),
    }
    .into_response()
}
