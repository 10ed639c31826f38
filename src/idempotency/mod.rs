// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! At-most-once admission of mutating requests.
//!
//! A POST/PUT/PATCH/DELETE must carry an `Idempotency-Key`. The admission key
//! is a SHA-256 over `actor | METHOD path | client key | base64(sha256(body))`
//! and is inserted once, with a TTL, into the shared store. A second request
//! with the same tuple inside the window is refused with 409. Admission
//! records are never removed early, even when the handler fails.

pub mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderName, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64ct::{Base64, Encoding};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub use store::{IdempotencyStore, InMemoryIdempotencyStore, StoreError};

use crate::auth::VerifiedClaims;
use crate::context::{caller_ip, Subject};
use crate::state::AppState;

pub const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// Default admission window (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Largest body buffered for hashing (1 MiB).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Idempotency-Key required")]
    MissingKey,

    #[error("Duplicate operation")]
    Duplicate,

    #[error("Request body too large")]
    BodyTooLarge,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for IdempotencyError {
    fn into_response(self) -> Response {
        let status = match self {
            IdempotencyError::MissingKey => StatusCode::BAD_REQUEST,
            IdempotencyError::Duplicate => StatusCode::CONFLICT,
            IdempotencyError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            IdempotencyError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Methods subject to admission control.
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Composite admission key, hex encoded.
pub fn admission_key(actor: &str, method: &Method, path: &str, client_key: &str, body: &[u8]) -> String {
    let body_hash = Base64::encode_string(&Sha256::digest(body));
    let material = format!("{actor}|{} {path}|{client_key}|{body_hash}", method.as_str());
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

/// Admission control over an [`IdempotencyStore`].
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Admit `key` once per TTL window.
    pub async fn admit(&self, key: &str) -> Result<(), IdempotencyError> {
        if self.store.insert_if_absent(key, self.ttl).await? {
            Ok(())
        } else {
            Err(IdempotencyError::Duplicate)
        }
    }
}

/// Subject id, else token subject, else caller IP.
fn actor_of(request: &Request) -> String {
    let extensions = request.extensions();
    extensions
        .get::<Subject>()
        .and_then(|s| s.external_id.clone())
        .or_else(|| extensions.get::<VerifiedClaims>().and_then(|c| c.claims.sub.clone()))
        .or_else(|| caller_ip(request).map(|ip| ip.to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Idempotency middleware; applied per mutating route.
pub async fn guard_idempotency(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match admit_request(&state.idempotency, request).await {
        Ok(request) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

async fn admit_request(guard: &IdempotencyGuard, request: Request) -> Result<Request, IdempotencyError> {
    if !is_mutating(request.method()) {
        return Ok(request);
    }

    let client_key = request
        .headers()
        .get(&IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .ok_or(IdempotencyError::MissingKey)?;

    let actor = actor_of(&request);
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| IdempotencyError::BodyTooLarge)?;

    let key = admission_key(&actor, &parts.method, parts.uri.path(), &client_key, &bytes);
    match guard.admit(&key).await {
        Ok(()) => {}
        Err(IdempotencyError::Duplicate) => {
            info!(actor = %actor, path = %parts.uri.path(), "Duplicate operation refused");
            return Err(IdempotencyError::Duplicate);
        }
        Err(e) => {
            warn!(error = %e, "Idempotency store failure, refusing request");
            return Err(e);
        }
    }

    Ok(Request::from_parts(parts, Body::from(bytes)))
}
