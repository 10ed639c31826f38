// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication and role-gate error type.
///
/// Every token failure is terminal for the request: nothing downstream of
/// the verifier runs.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingAuthHeader,

    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    #[error("Token is malformed")]
    MalformedToken,

    #[error("Unsupported JWT alg: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Token issuer is invalid")]
    InvalidIssuer,

    #[error("Token audience is invalid")]
    InvalidAudience,

    #[error("No verification key available for this token")]
    NoMatchingKey,

    #[error("Failed to fetch JWKS: {0}")]
    JwksFetchError(String),

    #[error("Access Denied - Missing role")]
    MissingRole { required: Vec<String> },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_roles: Option<Vec<String>>,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::JwksFetchError(_) => "jwks_unavailable",
            AuthError::MissingRole { .. } => "missing_role",
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// A JWKS outage is still a rejection (fail closed), reported as 503 so
    /// callers can tell it apart from a bad token.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::JwksFetchError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::MissingRole { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let error = self.to_string();
        let required_roles = match self {
            AuthError::MissingRole { required } => Some(required),
            _ => None,
        };
        let body = Json(AuthErrorBody {
            error,
            error_code,
            required_roles,
        });
        (status, body).into_response()
    }
}
