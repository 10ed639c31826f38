// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service-to-service probes. Authenticated and role-gated, no PDP.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{InternalStatusResponse, VerifiedCounts};
use crate::state::AppState;

/// Whether a user owns at least one verified account.
#[utoipa::path(
    get,
    path = "/api/internal/accounts/status/{external_id}",
    tag = "Internal",
    params(("external_id" = String, Path, description = "User external id (UUID)")),
    responses(
        (status = 200, description = "Verification status", body = InternalStatusResponse),
        (status = 403, description = "Missing role"),
        (status = 404, description = "Not a UUID")
    )
)]
pub async fn account_status(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<InternalStatusResponse>, ApiError> {
    let external_id = Uuid::parse_str(&external_id)
        .map_err(|_| ApiError::not_found("Not found"))?
        .to_string();

    let verified = state.accounts.read().await.count_verified(&external_id);
    Ok(Json(InternalStatusResponse {
        verified: verified > 0,
        counts: VerifiedCounts { verified },
        external_id,
    }))
}
