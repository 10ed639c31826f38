// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory bank-account registry.
//!
//! Accounts are keyed by id with a unique index on the compact RIB. The
//! registry lives behind a `tokio::sync::RwLock` in [`crate::state::AppState`];
//! methods take `&self`/`&mut self` and never block.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{canonical_owner_id, BankAccount, BankAccountStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountStoreError {
    #[error("Bank account already exists")]
    Conflict,

    #[error("Bank account not found")]
    NotFound,
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: HashMap<Uuid, BankAccount>,
    by_number: HashMap<String, Uuid>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new account; the compact number must be unused.
    pub fn insert(&mut self, mut account: BankAccount) -> Result<BankAccount, AccountStoreError> {
        account.external_id = account.external_id.as_deref().map(canonical_owner_id);
        let number = account.rib.compact();
        if self.by_number.contains_key(&number) || self.accounts.contains_key(&account.id) {
            return Err(AccountStoreError::Conflict);
        }
        self.by_number.insert(number, account.id);
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    pub fn get(&self, id: Uuid) -> Option<&BankAccount> {
        self.accounts.get(&id)
    }

    pub fn find_by_number(&self, compact: &str) -> Option<&BankAccount> {
        self.by_number
            .get(compact)
            .and_then(|id| self.accounts.get(id))
    }

    /// Accounts owned by `external_id`, newest first.
    pub fn list_for_user(&self, external_id: &str, verified_only: bool) -> Vec<BankAccount> {
        let external_id = canonical_owner_id(external_id);
        let external_id = external_id.as_str();
        let mut accounts: Vec<BankAccount> = self
            .accounts
            .values()
            .filter(|a| a.external_id.as_deref() == Some(external_id))
            .filter(|a| !verified_only || a.status == BankAccountStatus::Verified)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        accounts
    }

    pub fn count_verified(&self, external_id: &str) -> usize {
        let external_id = canonical_owner_id(external_id);
        let external_id = external_id.as_str();
        self.accounts
            .values()
            .filter(|a| a.external_id.as_deref() == Some(external_id))
            .filter(|a| a.status == BankAccountStatus::Verified)
            .count()
    }

    /// Apply `change` to an account and bump `updated_at`.
    pub fn update<F>(&mut self, id: Uuid, now: DateTime<Utc>, change: F) -> Result<BankAccount, AccountStoreError>
    where
        F: FnOnce(&mut BankAccount),
    {
        let account = self.accounts.get_mut(&id).ok_or(AccountStoreError::NotFound)?;
        change(account);
        account.external_id = account.external_id.as_deref().map(canonical_owner_id);
        account.updated_at = now;
        Ok(account.clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
