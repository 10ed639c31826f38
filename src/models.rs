// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Domain record of a bank account plus the request and response bodies of
//! the bank-account endpoints. Wire field names are the French names used by
//! the back office and the mobile clients (`numero_compte`, `statut`, ...).
//!
//! ## Model Categories
//!
//! - **Domain**: [`BankAccount`], [`BankAccountStatus`], [`CreatedVia`]
//! - **Requests**: provisioning, claim, link, list filter
//! - **Responses**: account views and mutation acknowledgements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::rib::{self, StructuredAccountNumber};

// =============================================================================
// Domain
// =============================================================================

/// Lifecycle of a bank account. Only `verifie` counts as active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
pub enum BankAccountStatus {
    /// Provisioned by the back office, no owner yet.
    #[serde(rename = "pre_associe")]
    PreAssociated,
    /// Owner known, not verified.
    #[serde(rename = "inactif")]
    Inactive,
    #[serde(rename = "verifie")]
    Verified,
    #[serde(rename = "rejete")]
    Rejected,
}

impl BankAccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankAccountStatus::PreAssociated => "pre_associe",
            BankAccountStatus::Inactive => "inactif",
            BankAccountStatus::Verified => "verifie",
            BankAccountStatus::Rejected => "rejete",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, BankAccountStatus::Verified)
    }

    /// Display label: "Vérifié" when active, the upper-cased status otherwise.
    pub fn label(&self) -> String {
        if self.is_active() {
            "Vérifié".to_string()
        } else {
            self.as_str().to_ascii_uppercase()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreatedVia {
    Backoffice,
    Claim,
}

/// A bank account known to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    pub id: Uuid,
    /// Owner (Keycloak subject)
    pub external_id: Option<String>,
    pub agency_id: Option<String>,
    pub rib: StructuredAccountNumber,
    pub bank_name: String,
    pub label: String,
    pub holder_name: Option<String>,
    /// HMAC-SHA256 of the national id; the raw value is never kept
    pub national_id_hash: Option<String>,
    pub phone_reference: Option<String>,
    pub core_reference: Option<String>,
    pub status: BankAccountStatus,
    pub created_by: Option<String>,
    pub created_via: CreatedVia,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Requests
// =============================================================================

/// Back-office provisioning of an account, with or without an owner.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProvisionAccountRequest {
    /// 5 characters, `[0-9A-Z]`
    pub code_banque: String,
    /// 5 characters, `[0-9A-Z]`
    pub code_agence: String,
    /// 11 characters, `[0-9A-Z]`
    pub numero_compte_core: String,
    /// Computed when absent.
    #[serde(default)]
    pub cle_rib: Option<String>,
    pub banque_nom: String,
    pub intitule: String,
    #[serde(default)]
    pub titulaire_nom: Option<String>,
    /// Hashed before storage.
    #[serde(default)]
    pub identifiant_national: Option<String>,
    #[serde(default)]
    pub telephone_reference: Option<String>,
    #[serde(default)]
    pub meta_core_ref: Option<String>,
    /// Owner to bind the account to (UUID).
    #[serde(default)]
    pub external_id: Option<String>,
    /// Mark the account verified right away.
    #[serde(default)]
    pub verify: bool,
    #[serde(default)]
    pub agency_id: Option<String>,
}

impl ProvisionAccountRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        rib_field("code_banque", &self.code_banque, rib::BANK_CODE_LEN)?;
        rib_field("code_agence", &self.code_agence, rib::BRANCH_CODE_LEN)?;
        rib_field("numero_compte_core", &self.numero_compte_core, rib::ACCOUNT_CORE_LEN)?;
        if let Some(key) = non_empty(&self.cle_rib) {
            rib_field("cle_rib", key, rib::CHECK_KEY_LEN)?;
        }
        required("banque_nom", &self.banque_nom, 100)?;
        required("intitule", &self.intitule, 100)?;
        max_len("titulaire_nom", &self.titulaire_nom, 255)?;
        max_len("identifiant_national", &self.identifiant_national, 190)?;
        max_len("telephone_reference", &self.telephone_reference, 30)?;
        max_len("meta_core_ref", &self.meta_core_ref, 190)?;
        max_len("agency_id", &self.agency_id, 64)?;
        if let Some(owner) = non_empty(&self.external_id) {
            uuid_field("external_id", owner)?;
        }
        Ok(())
    }

    /// Owner in canonical UUID form.
    pub fn owner(&self) -> Option<String> {
        non_empty(&self.external_id).map(canonical_owner_id)
    }

    pub fn agency(&self) -> Option<&str> {
        non_empty(&self.agency_id)
    }
}

/// Proofs supplied by a customer claiming an account.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClaimProofs {
    /// Last four digits of the compact account number.
    pub last4: String,
    #[serde(default)]
    pub identifiant_national: Option<String>,
    /// 6 digits when present.
    #[serde(default)]
    pub otp: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClaimAccountRequest {
    /// Compact or spaced account number.
    pub numero_compte: String,
    pub preuves: ClaimProofs,
}

impl ClaimAccountRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        required("numero_compte", &self.numero_compte, 32)?;
        digits("preuves.last4", &self.preuves.last4, 4)?;
        if let Some(otp) = non_empty(&self.preuves.otp) {
            digits("preuves.otp", otp, 6)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LinkAccountRequest {
    /// Owner to bind (UUID).
    pub external_id: String,
    #[serde(default)]
    pub agency_id: Option<String>,
}

impl LinkAccountRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        uuid_field("external_id", &self.external_id)?;
        max_len("agency_id", &self.agency_id, 64)
    }

    /// Owner in canonical UUID form.
    pub fn owner(&self) -> String {
        canonical_owner_id(&self.external_id)
    }

    pub fn agency(&self) -> Option<&str> {
        non_empty(&self.agency_id)
    }
}

/// Query of `GET /api/bank-accounts`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAccountsQuery {
    /// Only verified accounts (`true`, `1`, `yes`, `on`).
    #[serde(default)]
    pub verified: Option<String>,
}

impl ListAccountsQuery {
    pub fn verified_only(&self) -> bool {
        self.verified
            .as_deref()
            .map(parse_lenient_bool)
            .unwrap_or(false)
    }
}

/// `true`, `1`, `yes`, `on` (any case) are true; everything else is false.
pub fn parse_lenient_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::unprocessable(format!("The {field} field is required.")));
    }
    if value.chars().count() > max {
        return Err(ApiError::unprocessable(format!(
            "The {field} field must not be greater than {max} characters."
        )));
    }
    Ok(())
}

fn max_len(field: &str, value: &Option<String>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::unprocessable(format!(
            "The {field} field must not be greater than {max} characters."
        ))),
        _ => Ok(()),
    }
}

fn rib_field(field: &str, value: &str, len: usize) -> Result<(), ApiError> {
    let value = value.trim();
    if value.chars().count() != len || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::unprocessable(format!(
            "The {field} field must be {len} characters [0-9A-Z]."
        )));
    }
    Ok(())
}

fn digits(field: &str, value: &str, len: usize) -> Result<(), ApiError> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::unprocessable(format!("The {field} field must be {len} digits.")));
    }
    Ok(())
}

fn uuid_field(field: &str, value: &str) -> Result<String, ApiError> {
    Uuid::parse_str(value.trim())
        .map(|id| id.to_string())
        .map_err(|_| ApiError::unprocessable(format!("The {field} field must be a valid UUID.")))
}

/// Owner ids are stored and compared as lower-case hyphenated UUIDs.
/// Anything that does not parse as a UUID is only trimmed.
pub fn canonical_owner_id(raw: &str) -> String {
    let raw = raw.trim();
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

// =============================================================================
// Responses
// =============================================================================

/// Account as shown to its owner.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct BankAccountView {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub numero_compte: String,
    pub numero_compte_masque: String,
    pub banque_nom: String,
    pub intitule: String,
    pub titulaire_nom: Option<String>,
    pub statut: BankAccountStatus,
    pub statut_label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&BankAccount> for BankAccountView {
    fn from(account: &BankAccount) -> Self {
        Self {
            id: account.id,
            external_id: account.external_id.clone(),
            numero_compte: account.rib.compact(),
            numero_compte_masque: account.rib.masked(),
            banque_nom: account.bank_name.clone(),
            intitule: account.label.clone(),
            titulaire_nom: account.holder_name.clone(),
            statut: account.status,
            statut_label: account.status.label(),
            is_active: account.status.is_active(),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountListMeta {
    pub total: usize,
    pub verified_count: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountListResponse {
    pub success: bool,
    pub data: Vec<BankAccountView>,
    pub meta: AccountListMeta,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountDetailResponse {
    pub success: bool,
    pub data: BankAccountView,
}

/// Freshly provisioned account.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionedAccount {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub numero_compte: String,
    pub numero_compte_masque: String,
    pub banque_nom: String,
    pub intitule: String,
    pub statut: BankAccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&BankAccount> for ProvisionedAccount {
    fn from(account: &BankAccount) -> Self {
        Self {
            id: account.id,
            external_id: account.external_id.clone(),
            numero_compte: account.rib.compact(),
            numero_compte_masque: account.rib.masked(),
            banque_nom: account.bank_name.clone(),
            intitule: account.label.clone(),
            statut: account.status,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionResponse {
    pub success: bool,
    pub message: String,
    pub data: ProvisionedAccount,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct AccountRef {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub statut: BankAccountStatus,
}

impl From<&BankAccount> for AccountRef {
    fn from(account: &BankAccount) -> Self {
        Self {
            id: account.id,
            external_id: account.external_id.clone(),
            statut: account.status,
        }
    }
}

/// Acknowledgement of a claim or a link.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AccountRef>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifiedCounts {
    pub verified: usize,
}

/// Answer of the internal status probe used by sibling services.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InternalStatusResponse {
    pub external_id: String,
    pub verified: bool,
    pub counts: VerifiedCounts,
}
