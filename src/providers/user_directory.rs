// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User management lookups.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, StatusCode};
use tracing::warn;

use super::{ServiceTokenProvider, UpstreamError, UserDirectory};
use crate::http_client::{send_with_retry, RetryPolicy};

const SERVICE: &str = "User Management";

pub struct UserDirectoryClient {
    base_url: String,
    http: Client,
    retry: RetryPolicy,
    tokens: Arc<dyn ServiceTokenProvider>,
}

impl UserDirectoryClient {
    pub fn new(base_url: impl Into<String>, http: Client, tokens: Arc<dyn ServiceTokenProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::default(),
            tokens,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn user_url(&self, external_id: &str) -> String {
        format!("{}/api/users/external/{}", self.base_url, external_id)
    }
}

#[async_trait]
impl UserDirectory for UserDirectoryClient {
    async fn assert_user_exists(&self, external_id: &str) -> Result<(), UpstreamError> {
        if self.base_url.is_empty() {
            return Err(UpstreamError::NotConfigured("USER_MANAGEMENT_URL"));
        }

        let token = self.tokens.service_token().await?;
        let url = self.user_url(external_id);
        let response = send_with_retry(self.retry, || {
            self.http
                .get(&url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json")
        })
        .await
        .map_err(|e| UpstreamError::Unreachable {
            service: SERVICE,
            detail: e.to_string(),
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(UpstreamError::UserNotFound),
            status if status.is_success() => Ok(()),
            status => {
                warn!(external_id, status = status.as_u16(), "User Management lookup failed");
                Err(UpstreamError::Status {
                    service: SERVICE,
                    status: status.as_u16(),
                })
            }
        }
    }
}
