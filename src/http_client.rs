// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound HTTP with a bounded timeout and fixed-backoff retries.
//!
//! Every outbound call (JWKS fetch, service token, ceilings, user
//! management) goes through [`send_with_retry`]. Only idempotent requests
//! should be sent this way: a retried request may reach the server twice.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tracing::warn;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Retry schedule for outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// No retries; used in tests against unroutable hosts.
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

/// Build a client with the given request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Send a request, retrying transport errors and 5xx responses.
///
/// `make` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`. After the last attempt the final response (even a 5xx) or the
/// final transport error is returned.
pub async fn send_with_retry<F>(policy: RetryPolicy, mut make: F) -> Result<Response, reqwest::Error>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match make().send().await {
            Ok(response) if response.status().is_server_error() && attempt < policy.retries => {
                warn!(
                    status = response.status().as_u16(),
                    url = %response.url(),
                    attempt,
                    "Upstream returned server error, retrying"
                );
            }
            Ok(response) => return Ok(response),
            Err(e) if attempt < policy.retries => {
                warn!(error = %e, attempt, "Upstream request failed, retrying");
            }
            Err(e) => return Err(e),
        }
        attempt += 1;
        tokio::time::sleep(policy.backoff).await;
    }
}
