// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bank account endpoints.
//!
//! Customers list, read and claim their accounts; back-office agents
//! provision accounts and link them to customers. Every route sits behind
//! the authentication, context, policy and role stages; mutations also go
//! through the idempotency guard.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{roles::AGENCY_SCOPED, Actor, VerifiedClaims};
use crate::error::ApiError;
use crate::models::{
    canonical_owner_id, AccountDetailResponse, AccountListMeta, AccountListResponse, AccountRef,
    BankAccount, BankAccountStatus, BankAccountView, ClaimAccountRequest, CreatedVia,
    LinkAccountRequest, ListAccountsQuery, MutationResponse, ProvisionAccountRequest,
    ProvisionResponse, ProvisionedAccount,
};
use crate::policy::{AuditEvent, AuditEventType};
use crate::rib::{self, StructuredAccountNumber};
use crate::state::AppState;

/// Currency of the default ceiling created for new owners.
pub const DEFAULT_CURRENCY: &str = "XAF";

/// HMAC-SHA256 of the trimmed, lower-cased national id, hex encoded.
pub fn hash_national_id(pepper: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let mut mac = Hmac::<Sha256>::new_from_slice(pepper.as_bytes()).ok()?;
    mac.update(value.to_lowercase().as_bytes());
    Some(format!("{:x}", mac.finalize().into_bytes()))
}

fn owner_of(actor: &Actor) -> Result<String, ApiError> {
    actor
        .external_id()
        .map(canonical_owner_id)
        .ok_or_else(|| ApiError::unauthorized("Utilisateur non identifié"))
}

/// Agency-scoped back-office roles may only act inside their own agency.
fn assert_same_agency(actor: &Actor, payload_agency: Option<&str>) -> Result<(), ApiError> {
    if !actor.subject.has_any_role(&AGENCY_SCOPED) {
        return Ok(());
    }
    match (payload_agency, actor.subject.agency_id.as_deref()) {
        (Some(wanted), Some(own)) if wanted != own => {
            info!(
                request_id = %actor.context.request_id,
                wanted,
                own,
                "Cross-agency action refused"
            );
            Err(ApiError::forbidden("Forbidden - Cross-agency action"))
        }
        _ => Ok(()),
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Best effort: a failure is logged and the request still succeeds.
async fn ensure_ceiling(state: &AppState, external_id: &str, request_id: &str) {
    if let Err(e) = state
        .ceilings
        .ensure_default(external_id, Some(DEFAULT_CURRENCY), Some(request_id))
        .await
    {
        warn!(request_id, external_id, error = %e, "ceilings.ensure_default failed");
    }
}

/// List the caller's accounts, newest first.
#[utoipa::path(
    get,
    path = "/api/bank-accounts",
    tag = "BankAccounts",
    params(ListAccountsQuery),
    responses(
        (status = 200, description = "Accounts of the caller", body = AccountListResponse),
        (status = 401, description = "Caller not identified"),
        (status = 403, description = "Denied by policy or missing role")
    )
)]
pub async fn list_accounts(
    actor: Actor,
    State(state): State<AppState>,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<AccountListResponse>, ApiError> {
    let owner = owner_of(&actor)?;
    let accounts = state.accounts.read().await;
    let data: Vec<BankAccountView> = accounts
        .list_for_user(&owner, query.verified_only())
        .iter()
        .map(BankAccountView::from)
        .collect();

    Ok(Json(AccountListResponse {
        success: true,
        meta: AccountListMeta {
            total: data.len(),
            verified_count: accounts.count_verified(&owner),
        },
        data,
    }))
}

/// Read one of the caller's accounts. Foreign accounts look missing.
#[utoipa::path(
    get,
    path = "/api/bank-accounts/{id}",
    tag = "BankAccounts",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = AccountDetailResponse),
        (status = 404, description = "Unknown or foreign account")
    )
)]
pub async fn get_account(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountDetailResponse>, ApiError> {
    let owner = owner_of(&actor)?;
    let not_found = || ApiError::not_found("Compte non trouvé");
    let id = Uuid::parse_str(&id).map_err(|_| not_found())?;

    let accounts = state.accounts.read().await;
    let account = accounts
        .get(id)
        .filter(|a| a.external_id.as_deref() == Some(owner.as_str()))
        .ok_or_else(not_found)?;

    Ok(Json(AccountDetailResponse {
        success: true,
        data: BankAccountView::from(account),
    }))
}

/// Customer self-service: bind an existing account using its last four
/// digits as proof.
///
/// Unknown numbers, and numbers already bound to someone else, get the same
/// neutral answer so the endpoint cannot be used to probe for accounts.
#[utoipa::path(
    post,
    path = "/api/bank-accounts/claim",
    tag = "BankAccounts",
    request_body = ClaimAccountRequest,
    params(("Idempotency-Key" = String, Header, description = "Client idempotency key")),
    responses(
        (status = 200, description = "Claim processed", body = MutationResponse),
        (status = 409, description = "Duplicate operation"),
        (status = 422, description = "Invalid number or proofs")
    )
)]
pub async fn claim_account(
    actor: Actor,
    State(state): State<AppState>,
    Json(request): Json<ClaimAccountRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let owner = owner_of(&actor)?;
    request.validate()?;
    let compact = rib::compact_from_raw(&request.numero_compte)?;
    let request_id = actor.context.request_id.as_str();

    let received = || {
        Json(MutationResponse {
            success: true,
            message: "Demande reçue".to_string(),
            data: None,
        })
    };

    let claimed = {
        let mut accounts = state.accounts.write().await;
        let Some(account) = accounts.find_by_number(&compact).cloned() else {
            return Ok(received());
        };
        if account.external_id.as_deref().is_some_and(|o| o != owner) {
            return Ok(received());
        }
        if account.rib.last4() != request.preuves.last4 {
            return Err(ApiError::unprocessable("Preuves insuffisantes (last4)"));
        }

        let agency = actor.subject.agency_id.clone();
        accounts.update(account.id, state.clock.now(), |a| {
            a.external_id = Some(owner.clone());
            if a.agency_id.is_none() {
                a.agency_id = agency;
            }
            a.status = BankAccountStatus::Verified;
            a.created_via = CreatedVia::Claim;
        })?
    };

    ensure_ceiling(&state, &owner, request_id).await;

    state.audit.record(
        AuditEvent::new(AuditEventType::AccountClaimed)
            .with_request_id(request_id)
            .with_actor(Some(owner.as_str()))
            .with_resource(claimed.id.to_string())
            .with_details(json!({
                "external_id": owner,
                "account_id": claimed.id,
                "statut": claimed.status,
            })),
    );

    Ok(Json(MutationResponse {
        success: true,
        message: "Compte associé avec succès".to_string(),
        data: Some(AccountRef::from(&claimed)),
    }))
}

/// Back office: register an account, optionally bound to an owner.
#[utoipa::path(
    post,
    path = "/api/admin/bank-accounts",
    tag = "Backoffice",
    request_body = ProvisionAccountRequest,
    params(("Idempotency-Key" = String, Header, description = "Client idempotency key")),
    responses(
        (status = 201, description = "Account provisioned", body = ProvisionResponse),
        (status = 403, description = "Denied, missing role or cross-agency"),
        (status = 409, description = "Account already exists or duplicate operation"),
        (status = 422, description = "Validation failed or invalid RIB"),
        (status = 503, description = "User management unavailable")
    )
)]
pub async fn provision_account(
    actor: Actor,
    Extension(claims): Extension<VerifiedClaims>,
    State(state): State<AppState>,
    Json(request): Json<ProvisionAccountRequest>,
) -> Result<(StatusCode, Json<ProvisionResponse>), ApiError> {
    request.validate()?;
    assert_same_agency(&actor, request.agency())?;
    let request_id = actor.context.request_id.as_str();

    let rib = match trimmed(&request.cle_rib) {
        Some(key) => StructuredAccountNumber::from_parts(
            &request.code_banque,
            &request.code_agence,
            &request.numero_compte_core,
            &key,
        )?,
        None => StructuredAccountNumber::with_computed_key(
            &request.code_banque,
            &request.code_agence,
            &request.numero_compte_core,
        )?,
    };

    if state.accounts.read().await.find_by_number(&rib.compact()).is_some() {
        return Err(ApiError::conflict("Bank account already exists"));
    }

    let owner = request.owner();
    if let Some(owner) = owner.as_deref() {
        if !state.settings.skip_um_check {
            state.users.assert_user_exists(owner).await?;
        }
    }

    let status = if request.verify {
        BankAccountStatus::Verified
    } else if owner.is_some() {
        BankAccountStatus::Inactive
    } else {
        BankAccountStatus::PreAssociated
    };

    let national_id_hash = match (trimmed(&request.identifiant_national), &state.settings.hash_pepper) {
        (Some(value), Some(pepper)) => hash_national_id(pepper, &value),
        (Some(_), None) => {
            warn!(request_id, "HASH_PEPPER not set, national id dropped");
            None
        }
        (None, _) => None,
    };

    let agency_id = request
        .agency()
        .map(str::to_string)
        .or_else(|| actor.subject.agency_id.clone());
    let actor_name = claims.actor_name().map(str::to_string);
    let now = state.clock.now();

    let account = state.accounts.write().await.insert(BankAccount {
        id: Uuid::new_v4(),
        external_id: owner.clone(),
        agency_id: agency_id.clone(),
        rib,
        bank_name: request.banque_nom.trim().to_string(),
        label: request.intitule.trim().to_string(),
        holder_name: trimmed(&request.titulaire_nom),
        national_id_hash,
        phone_reference: trimmed(&request.telephone_reference),
        core_reference: trimmed(&request.meta_core_ref),
        status,
        created_by: actor_name.clone(),
        created_via: CreatedVia::Backoffice,
        created_at: now,
        updated_at: now,
    })?;

    if let Some(owner) = owner.as_deref() {
        ensure_ceiling(&state, owner, request_id).await;
    }

    state.audit.record(
        AuditEvent::new(AuditEventType::AccountProvisioned)
            .with_request_id(request_id)
            .with_actor(actor_name)
            .with_resource(account.id.to_string())
            .with_details(json!({
                "external_id": owner,
                "agency_id": agency_id,
                "account_id": account.id,
                "numero_compte": account.rib.compact(),
                "statut": account.status,
            })),
    );

    Ok((
        StatusCode::CREATED,
        Json(ProvisionResponse {
            success: true,
            message: "Compte bancaire provisionné".to_string(),
            data: ProvisionedAccount::from(&account),
        }),
    ))
}

/// Back office: bind a provisioned account to a customer.
#[utoipa::path(
    post,
    path = "/api/admin/bank-accounts/{id}/link",
    tag = "Backoffice",
    request_body = LinkAccountRequest,
    params(
        ("id" = String, Path, description = "Account id"),
        ("Idempotency-Key" = String, Header, description = "Client idempotency key")
    ),
    responses(
        (status = 200, description = "Account linked", body = MutationResponse),
        (status = 404, description = "Unknown account"),
        (status = 422, description = "Validation failed or unknown user"),
        (status = 503, description = "User management unavailable")
    )
)]
pub async fn link_account(
    actor: Actor,
    Extension(claims): Extension<VerifiedClaims>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<LinkAccountRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    request.validate()?;
    assert_same_agency(&actor, request.agency())?;
    let request_id = actor.context.request_id.as_str();
    let owner = request.owner();

    state.users.assert_user_exists(&owner).await?;

    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found("Compte introuvable"))?;
    let agency_id = request
        .agency()
        .map(str::to_string)
        .or_else(|| actor.subject.agency_id.clone());

    let linked = state
        .accounts
        .write()
        .await
        .update(id, state.clock.now(), |a| {
            a.external_id = Some(owner.clone());
            a.agency_id = agency_id.clone();
            if a.status == BankAccountStatus::PreAssociated {
                a.status = BankAccountStatus::Verified;
            }
        })?;

    ensure_ceiling(&state, &owner, request_id).await;

    state.audit.record(
        AuditEvent::new(AuditEventType::AccountLinked)
            .with_request_id(request_id)
            .with_actor(claims.actor_name())
            .with_resource(linked.id.to_string())
            .with_details(json!({
                "external_id": owner,
                "agency_id": agency_id,
                "account_id": linked.id,
                "statut": linked.status,
            })),
    );

    Ok(Json(MutationResponse {
        success: true,
        message: "Compte lié à l'utilisateur".to_string(),
        data: Some(AccountRef::from(&linked)),
    }))
}
