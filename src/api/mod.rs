// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface.
//!
//! Protected route groups run, in order: token verification, context
//! builder, resource tagger, policy decision point, role gate and, for
//! mutations, the idempotency guard. The internal probe skips the context
//! and policy stages. Every response carries `X-Request-Id`.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    auth::{
        authenticate, require_any_role,
        roles::{ADMIN, AGENT_KYC, CLIENT_BANCAIRE, CLIENT_NON_BANCAIRE, SVC_BANKACCOUNT},
        RequiredRoles,
    },
    context::enrich_context,
    idempotency::guard_idempotency,
    models::{
        AccountDetailResponse, AccountListMeta, AccountListResponse, AccountRef,
        BankAccountStatus, BankAccountView, ClaimAccountRequest, ClaimProofs,
        InternalStatusResponse, LinkAccountRequest, MutationResponse, ProvisionAccountRequest,
        ProvisionResponse, ProvisionedAccount, VerifiedCounts,
    },
    policy::{enforce_policy, tag_resource, ResourceTag},
    state::AppState,
};

pub mod bank_accounts;
pub mod health;
pub mod internal;

/// Wrap a route group in the full zero-trust pipeline.
///
/// Layers added last run first.
fn protected(routes: Router<AppState>, state: &AppState, tag: ResourceTag, roles: RequiredRoles) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(roles, require_any_role))
        .route_layer(from_fn_with_state(state.clone(), enforce_policy))
        .route_layer(from_fn_with_state(tag, tag_resource))
        .route_layer(from_fn_with_state(state.clone(), enrich_context))
        .route_layer(from_fn_with_state(state.clone(), authenticate))
}

pub fn router(state: AppState) -> Router {
    let idempotent = || from_fn_with_state(state.clone(), guard_idempotency);

    let customer_list = protected(
        Router::new().route("/api/bank-accounts", get(bank_accounts::list_accounts)),
        &state,
        ResourceTag::Financial,
        RequiredRoles::any_of(&[CLIENT_BANCAIRE, CLIENT_NON_BANCAIRE]),
    );

    let customer_owned = protected(
        Router::new()
            .route(
                "/api/bank-accounts/claim",
                post(bank_accounts::claim_account).layer(idempotent()),
            )
            .route("/api/bank-accounts/{id}", get(bank_accounts::get_account)),
        &state,
        ResourceTag::Financial,
        RequiredRoles::any_of(&[CLIENT_BANCAIRE]),
    );

    let backoffice = protected(
        Router::new()
            .route(
                "/api/admin/bank-accounts",
                post(bank_accounts::provision_account).layer(idempotent()),
            )
            .route(
                "/api/admin/bank-accounts/{id}/link",
                post(bank_accounts::link_account).layer(idempotent()),
            ),
        &state,
        ResourceTag::Financial,
        RequiredRoles::any_of(&[ADMIN, AGENT_KYC]),
    );

    let internal = Router::new()
        .route(
            "/api/internal/accounts/status/{external_id}",
            get(internal::account_status),
        )
        .route_layer(from_fn_with_state(
            RequiredRoles::any_of(&[ADMIN, SVC_BANKACCOUNT]),
            require_any_role,
        ))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api-doc/openapi.json", get(openapi_json))
        .merge(customer_list)
        .merge(customer_owned)
        .merge(backoffice)
        .merge(internal)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        bank_accounts::list_accounts,
        bank_accounts::get_account,
        bank_accounts::claim_account,
        bank_accounts::provision_account,
        bank_accounts::link_account,
        internal::account_status
    ),
    components(
        schemas(
            health::CheckStatus,
            health::ReadinessChecks,
            health::ReadinessReport,
            health::LivenessReport,
            BankAccountStatus,
            BankAccountView,
            AccountListMeta,
            AccountListResponse,
            AccountDetailResponse,
            ClaimProofs,
            ClaimAccountRequest,
            ProvisionAccountRequest,
            ProvisionedAccount,
            ProvisionResponse,
            LinkAccountRequest,
            AccountRef,
            MutationResponse,
            VerifiedCounts,
            InternalStatusResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "BankAccounts", description = "Customer bank accounts"),
        (name = "Backoffice", description = "Account provisioning and linking"),
        (name = "Internal", description = "Service-to-service probes")
    )
)]
pub struct ApiDoc;
