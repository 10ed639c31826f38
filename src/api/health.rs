// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Probes. The gateway is ready once it can verify tokens; companion
//! services are reported but never gate readiness.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Degraded,
    Unavailable,
    Missing,
    Disabled,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessChecks {
    /// Realm key set reachability; `disabled` when JWKS lookup is off.
    pub jwks: CheckStatus,
    /// Static verification key from configuration.
    pub static_key: CheckStatus,
    /// Client credentials for the ceilings and user-management calls.
    pub service_credentials: CheckStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessReport {
    pub status: CheckStatus,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessReport {
    pub status: CheckStatus,
    pub service: String,
    pub version: String,
}

async fn jwks_status(state: &AppState) -> CheckStatus {
    let Some(jwks) = state.verifier.jwks() else {
        return CheckStatus::Disabled;
    };
    if jwks.is_cached().await || jwks.refresh().await.is_ok() {
        CheckStatus::Ok
    } else {
        CheckStatus::Unavailable
    }
}

async fn readiness_report(state: &AppState) -> ReadinessReport {
    let jwks = jwks_status(state).await;
    let static_key = if state.verifier.has_static_key() {
        CheckStatus::Ok
    } else {
        CheckStatus::Missing
    };
    let service_credentials = if state.settings.client_id.is_empty() {
        CheckStatus::Missing
    } else {
        CheckStatus::Ok
    };

    let status = match (jwks, static_key) {
        (CheckStatus::Ok, _) => CheckStatus::Ok,
        // JWKS down but the static key still verifies.
        (CheckStatus::Unavailable, CheckStatus::Ok) => CheckStatus::Degraded,
        (_, CheckStatus::Ok) => CheckStatus::Ok,
        _ => CheckStatus::Unavailable,
    };

    ReadinessReport {
        status,
        checks: ReadinessChecks {
            jwks,
            static_key,
            service_credentials,
        },
    }
}

/// Full readiness report; 503 only when no token can be verified.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Tokens can be verified", body = ReadinessReport),
        (status = 503, description = "No usable verification key", body = ReadinessReport)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let report = readiness_report(&state).await;
    let code = match report.status {
        CheckStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(report))
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is up", body = LivenessReport))
)]
pub async fn liveness() -> Json<LivenessReport> {
    Json(LivenessReport {
        status: CheckStatus::Ok,
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready", body = ReadinessReport),
        (status = 503, description = "Not ready", body = ReadinessReport)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    health(state).await
}
