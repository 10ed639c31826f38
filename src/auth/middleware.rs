// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer authentication middleware.
//!
//! Applied to every protected route group with
//! `axum::middleware::from_fn_with_state(state, authenticate)`. On success
//! the [`VerifiedClaims`] are stored in the request extensions for the
//! context builder; on failure the request ends here with the
//! [`AuthError`] response.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::{AuthError, VerifiedClaims};
use crate::state::AppState;

/// Extract the raw token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(request: &Request) -> Result<&str, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AuthError::InvalidAuthHeader)?;

    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Authentication middleware function.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let verified: Result<VerifiedClaims, AuthError> = match bearer_token(&request) {
        Ok(token) => state.verifier.verify(token).await,
        Err(e) => Err(e),
    };

    match verified {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            debug!(
                error_code = e.error_code(),
                path = %request.uri().path(),
                "Rejected bearer token"
            );
            e.into_response()
        }
    }
}
