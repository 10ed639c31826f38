// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authenticated actor.
//!
//! Handlers behind the protected perimeter take an [`Actor`]:
//!
//! ```rust,ignore
//! async fn list_accounts(actor: Actor, State(state): State<AppState>) -> impl IntoResponse {
//!     // actor.subject.external_id, actor.context.request_id
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::context::{ContextError, RequestContext, Subject};

/// Subject and request context placed in the extensions by the context
/// builder.
#[derive(Debug, Clone)]
pub struct Actor {
    pub subject: Subject,
    pub context: RequestContext,
}

impl Actor {
    /// External id of the caller; `None` for service accounts without `sub`.
    pub fn external_id(&self) -> Option<&str> {
        self.subject.external_id.as_deref()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.subject.roles.iter().any(|r| r == role)
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ContextError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .extensions
            .get::<Subject>()
            .cloned()
            .ok_or(ContextError::MissingClaims)?;
        let context = parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(ContextError::MissingClaims)?;
        Ok(Actor { subject, context })
    }
}
