// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behaviour
//!
//! - The key set is fetched from the realm's `certs` endpoint through a
//!   [`JwksSource`] and cached for a configurable TTL (default 5 minutes).
//! - An expired or empty cache triggers a synchronous re-fetch. The lock is
//!   never held across the fetch, so concurrent misses may fetch in
//!   parallel; the last writer wins.
//! - Fetch failures are not cached.
//! - Only RSA keys that publish a certificate chain are usable: the first
//!   `x5c` certificate is wrapped into a PEM `CERTIFICATE` block. A bare
//!   modulus/exponent pair is not trusted on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::error::AuthError;
use crate::clock::Clock;
use crate::http_client::{send_with_retry, RetryPolicy};

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// One entry of the `keys` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySetEntry {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: String,
    /// RSA modulus (base64url). Parsed but never used as key material.
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent (base64url). Parsed but never used as key material.
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub x5c: Vec<String>,
}

/// A published key set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySet {
    #[serde(default)]
    pub keys: Vec<KeySetEntry>,
}

impl KeySet {
    /// Find the RSA entry for `kid` and build its decoding key from `x5c[0]`.
    ///
    /// Returns `Ok(None)` when no entry matches or it has no certificate.
    pub fn decoding_key(&self, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        let Some(entry) = self
            .keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid) && k.kty == "RSA")
        else {
            return Ok(None);
        };
        let Some(cert) = entry.x5c.first().map(|c| c.trim()).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let pem = certificate_pem(cert)?;
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map(Some)
            .map_err(|_| AuthError::NoMatchingKey)
    }
}

/// Wrap a base64 DER certificate into a PEM block.
pub fn certificate_pem(x5c: &str) -> Result<String, AuthError> {
    let der = Base64::decode_vec(x5c).map_err(|_| AuthError::NoMatchingKey)?;
    Ok(pem::encode(&pem::Pem::new("CERTIFICATE", der)))
}

/// Where key sets come from.
#[async_trait]
pub trait JwksSource: Send + Sync {
    async fn fetch(&self) -> Result<KeySet, AuthError>;
}

/// Fetches the key set over HTTP.
#[derive(Debug, Clone)]
pub struct HttpJwksSource {
    url: String,
    client: Client,
    retry: RetryPolicy,
}

impl HttpJwksSource {
    pub fn new(url: impl Into<String>, client: Client, retry: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            client,
            retry,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self) -> Result<KeySet, AuthError> {
        let response = send_with_retry(self.retry, || self.client.get(&self.url))
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<KeySet>()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))
    }
}

/// JWKS cache entry.
struct CacheEntry {
    keys: Arc<KeySet>,
    fetched_at: DateTime<Utc>,
}

/// TTL cache in front of a [`JwksSource`].
#[derive(Clone)]
pub struct JwksCache {
    source: Arc<dyn JwksSource>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
}

impl JwksCache {
    pub fn new(source: Arc<dyn JwksSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let age = self.clock.now() - entry.fetched_at;
        age.to_std().map(|age| age < self.cache_ttl).unwrap_or(true)
    }

    /// Current key set, fetching on miss.
    pub async fn key_set(&self) -> Result<Arc<KeySet>, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if self.is_fresh(entry) {
                    return Ok(entry.keys.clone());
                }
            }
        }

        debug!("JWKS cache miss, fetching key set");
        self.refresh().await
    }

    /// Force a fetch and replace the cached key set.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        let keys = Arc::new(self.source.fetch().await?);
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            keys: keys.clone(),
            fetched_at: self.clock.now(),
        });
        Ok(keys)
    }

    /// Decoding key for `kid`, `Ok(None)` if the set has no usable entry.
    pub async fn decoding_key(&self, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        self.key_set().await?.decoding_key(kid)
    }

    /// Check if a key set is currently cached and fresh.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        cache.as_ref().map(|e| self.is_fresh(e)).unwrap_or(false)
    }
}
