// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound service clients.
//!
//! - [`service_token::ServiceTokenClient`]: client-credentials token, cached
//! - [`ceilings::CeilingsClient`]: default spending ceiling for new owners
//! - [`user_directory::UserDirectoryClient`]: owner existence check
//!
//! Handlers depend on the [`CeilingsApi`] and [`UserDirectory`] traits so
//! tests can swap in fakes.

pub mod ceilings;
pub mod service_token;
pub mod user_directory;

use async_trait::async_trait;

pub use ceilings::CeilingsClient;
pub use service_token::{ServiceTokenClient, ServiceTokenProvider};
pub use user_directory::UserDirectoryClient;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{service} unreachable: {detail}")]
    Unreachable { service: &'static str, detail: String },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} response was invalid: {detail}")]
    InvalidResponse { service: &'static str, detail: String },

    #[error("Target user not found")]
    UserNotFound,
}

/// UserCeiling service.
#[async_trait]
pub trait CeilingsApi: Send + Sync {
    /// Make sure a default ceiling exists for `external_id`. Idempotent.
    async fn ensure_default(
        &self,
        external_id: &str,
        currency: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<(), UpstreamError>;
}

/// User management service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Err(UserNotFound)` when the directory does not know the user.
    async fn assert_user_exists(&self, external_id: &str) -> Result<(), UpstreamError>;
}
