// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use tokio::sync::RwLock;
use tracing::warn;

use crate::auth::verifier::static_key_from_config;
use crate::auth::{HttpJwksSource, JwksCache, TokenVerifier, VerifierSettings};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, Settings};
use crate::context::ContextBuilder;
use crate::http_client::{build_client, RetryPolicy};
use crate::idempotency::{IdempotencyGuard, IdempotencyStore, InMemoryIdempotencyStore};
use crate::policy::{AuditSink, PolicyEngine, TracingAuditSink};
use crate::providers::{
    CeilingsApi, CeilingsClient, ServiceTokenClient, ServiceTokenProvider, UserDirectory,
    UserDirectoryClient,
};
use crate::store::InMemoryAccountStore;

/// Shared application state, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub verifier: Arc<TokenVerifier>,
    pub context: Arc<ContextBuilder>,
    pub policy: Arc<PolicyEngine>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub accounts: Arc<RwLock<InMemoryAccountStore>>,
    pub ceilings: Arc<dyn CeilingsApi>,
    pub users: Arc<dyn UserDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire the production components from settings.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let http = build_client(settings.http_timeout).map_err(|e| ConfigError::Invalid {
            name: "HTTP_TIMEOUT",
            value: e.to_string(),
        })?;

        let mut verifier = TokenVerifier::new(verifier_settings(&settings)).with_clock(clock.clone());
        if settings.use_jwks {
            let source = HttpJwksSource::new(settings.jwks_url(), http.clone(), RetryPolicy::default());
            verifier = verifier
                .with_jwks(JwksCache::new(Arc::new(source), clock.clone()).with_cache_ttl(settings.jwks_ttl));
        }
        if let Some(raw) = &settings.public_key {
            verifier = verifier.with_static_key(parse_static_key(raw)?);
        }
        if !settings.use_jwks && settings.public_key.is_none() {
            warn!("No JWKS and no KEYCLOAK_PUBLIC_KEY: every token will be rejected");
        }

        let tokens: Arc<dyn ServiceTokenProvider> = Arc::new(ServiceTokenClient::new(
            settings.token_url(),
            settings.client_id.clone(),
            settings.client_secret.clone(),
            http.clone(),
            clock.clone(),
        ));
        let ceilings = CeilingsClient::new(settings.user_ceiling_url.clone(), http.clone(), tokens.clone());
        let users = UserDirectoryClient::new(settings.user_management_url.clone(), http, tokens);

        Ok(Self::new(settings, verifier, clock)
            .with_ceilings(Arc::new(ceilings))
            .with_users(Arc::new(users)))
    }

    /// Core pipeline with in-memory stores and unconfigured companions.
    pub fn new(settings: Settings, verifier: TokenVerifier, clock: Arc<dyn Clock>) -> Self {
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let store: Arc<dyn IdempotencyStore> = Arc::new(InMemoryIdempotencyStore::new(clock.clone()));
        let unconfigured = Arc::new(Unconfigured);

        Self {
            context: Arc::new(ContextBuilder::new(clock.clone(), !settings.production)),
            policy: Arc::new(PolicyEngine::new(settings.policy.clone(), audit.clone())),
            idempotency: Arc::new(IdempotencyGuard::new(store, settings.idempotency_ttl)),
            settings: Arc::new(settings),
            verifier: Arc::new(verifier),
            accounts: Arc::new(RwLock::new(InMemoryAccountStore::new())),
            ceilings: unconfigured.clone(),
            users: unconfigured,
            audit,
            clock,
        }
    }

    /// Replace the audit sink of both the PDP and the handlers.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.policy = Arc::new(PolicyEngine::new(self.settings.policy.clone(), audit.clone()));
        self.audit = audit;
        self
    }

    pub fn with_idempotency_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = Arc::new(IdempotencyGuard::new(store, self.settings.idempotency_ttl));
        self
    }

    pub fn with_ceilings(mut self, ceilings: Arc<dyn CeilingsApi>) -> Self {
        self.ceilings = ceilings;
        self
    }

    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }
}

fn verifier_settings(settings: &Settings) -> VerifierSettings {
    VerifierSettings {
        issuer: settings.issuer(),
        allowed_audiences: settings.allowed_audiences.clone(),
        use_jwks: settings.use_jwks,
        leeway_secs: settings.leeway_secs,
        role_clients: settings.role_clients.clone(),
    }
}

fn parse_static_key(raw: &str) -> Result<DecodingKey, ConfigError> {
    static_key_from_config(raw).map_err(|e| ConfigError::Invalid {
        name: "KEYCLOAK_PUBLIC_KEY",
        value: e.to_string(),
    })
}

/// Companion placeholder used until real clients are wired in.
struct Unconfigured;

#[async_trait::async_trait]
impl CeilingsApi for Unconfigured {
    async fn ensure_default(
        &self,
        _external_id: &str,
        _currency: Option<&str>,
        _request_id: Option<&str>,
    ) -> Result<(), crate::providers::UpstreamError> {
        Err(crate::providers::UpstreamError::NotConfigured("USER_CEILING_URL"))
    }
}

#[async_trait::async_trait]
impl UserDirectory for Unconfigured {
    async fn assert_user_exists(&self, _external_id: &str) -> Result<(), crate::providers::UpstreamError> {
        Err(crate::providers::UpstreamError::NotConfigured("USER_MANAGEMENT_URL"))
    }
}
