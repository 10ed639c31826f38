// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! UserCeiling client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{CeilingsApi, ServiceTokenProvider, UpstreamError};
use crate::context::X_REQUEST_ID;
use crate::http_client::{send_with_retry, RetryPolicy};
use crate::logging::redact_body;

const SERVICE: &str = "UserCeiling";

/// Request body of `POST /internal/ceilings/ensure`.
pub fn ensure_payload(external_id: &str, currency: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("external_id".into(), json!(external_id));
    if let Some(currency) = currency.map(str::trim).filter(|c| !c.is_empty()) {
        body.insert("currency".into(), json!(currency.to_ascii_uppercase()));
    }
    Value::Object(body)
}

pub struct CeilingsClient {
    base_url: String,
    http: Client,
    retry: RetryPolicy,
    tokens: Arc<dyn ServiceTokenProvider>,
}

impl CeilingsClient {
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
}

#[async_trait]
impl CeilingsApi for CeilingsClient {
    async fn ensure_default(
        &self,
        external_id: &str,
        currency: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<(), UpstreamError> {
        if self.base_url.is_empty() {
            return Err(UpstreamError::NotConfigured("USER_CEILING_URL"));
        }

        let token = self.tokens.service_token().await?;
        let url = format!("{}/internal/ceilings/ensure", self.base_url);
        let payload = ensure_payload(external_id, currency);

        let response = send_with_retry(self.retry, || {
            let mut request = self.http.post(&url).bearer_auth(&token).json(&payload);
            if let Some(request_id) = request_id {
                request = request.header(X_REQUEST_ID, request_id);
            }
            request
        })
        .await
        .map_err(|e| {
            warn!(external_id, error = %e, "UserCeiling unreachable");
            UpstreamError::Unreachable {
                service: SERVICE,
                detail: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(external_id, status, body = %redact_body(&body), "UserCeiling ensure failed");
            return Err(UpstreamError::Status {
                service: SERVICE,
                status,
            });
        }

        Ok(())
    }
}
