// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keycloak client-credentials token for service-to-service calls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::UpstreamError;
use crate::clock::Clock;
use crate::http_client::{send_with_retry, RetryPolicy};
use crate::logging::redact_body;

const SERVICE: &str = "keycloak token endpoint";

/// Assumed lifetime when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 300;

/// Cache lifetime for a token valid `expires_in` seconds: 30s early, at
/// least one minute.
pub fn cache_ttl_secs(expires_in: i64) -> i64 {
    (expires_in - 30).max(60)
}

#[async_trait]
pub trait ServiceTokenProvider: Send + Sync {
    async fn service_token(&self) -> Result<String, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    valid_until: DateTime<Utc>,
}

/// Fetches and caches the gateway's own access token.
pub struct ServiceTokenClient {
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    http: Client,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceTokenClient {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        http: Client,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.filter(|s| !s.is_empty()),
            http,
            retry: RetryPolicy::default(),
            clock,
            cached: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch(&self) -> Result<CachedToken, UpstreamError> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = send_with_retry(self.retry, || self.http.post(&self.token_url).form(&form))
            .await
            .map_err(|e| UpstreamError::Unreachable {
                service: SERVICE,
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %redact_body(&body), "Service token request refused");
            return Err(UpstreamError::Status {
                service: SERVICE,
                status,
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse {
                    service: SERVICE,
                    detail: e.to_string(),
                })?;

        if token.access_token.trim().is_empty() {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                detail: "token response did not include access_token".to_string(),
            });
        }

        let ttl = cache_ttl_secs(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        Ok(CachedToken {
            value: token.access_token,
            valid_until: self.clock.now() + chrono::Duration::seconds(ttl),
        })
    }
}

#[async_trait]
impl ServiceTokenProvider for ServiceTokenClient {
    async fn service_token(&self) -> Result<String, UpstreamError> {
        if self.client_id.is_empty() {
            return Err(UpstreamError::NotConfigured("KEYCLOAK_CLIENT_ID"));
        }

        // held across the fetch: one token request at a time
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.valid_until > self.clock.now() {
                return Ok(token.value.clone());
            }
        }

        debug!(client_id = %self.client_id, "Fetching service token");
        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}
