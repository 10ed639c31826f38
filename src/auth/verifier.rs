// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification.
//!
//! ## Steps
//!
//! 1. Exactly three dot-separated segments.
//! 2. Header `alg` must be `RS256`. `none` and every HMAC algorithm are
//!    rejected before any key is looked up.
//! 3. Key: JWKS entry for the header `kid` (when enabled), else the static
//!    realm public key.
//! 4. Signature, `exp` and `nbf` via `jsonwebtoken`; `iat` checked here
//!    against the injected [`Clock`]. All with the configured leeway.
//! 5. `iss` must equal the realm issuer URL exactly.
//! 6. With an audience allow-list, `aud` must intersect it or `azp` must be
//!    in it.
//! 7. Roles are aggregated from realm and selected client roles.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{debug, warn};

use super::claims::{TokenClaims, VerifiedClaims};
use super::error::AuthError;
use super::jwks::JwksCache;
use crate::clock::{Clock, SystemClock};

/// The only accepted signing algorithm.
pub const PINNED_ALGORITHM: &str = "RS256";

/// Default clock skew tolerance (30 seconds).
pub const DEFAULT_LEEWAY_SECS: u64 = 30;

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Expected `iss`, e.g. `https://kc.example/realms/bank`
    pub issuer: String,
    /// Accepted audiences; empty disables the audience check
    pub allowed_audiences: Vec<String>,
    /// Look keys up in the JWKS before falling back to the static key
    pub use_jwks: bool,
    /// Clock skew tolerance in seconds
    pub leeway_secs: u64,
    /// Clients whose `resource_access` roles are merged into the role set
    pub role_clients: Vec<String>,
}

impl VerifierSettings {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            allowed_audiences: Vec::new(),
            use_jwks: true,
            leeway_secs: DEFAULT_LEEWAY_SECS,
            role_clients: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Parse a static realm key: either a full PEM or the bare base64 body
/// Keycloak shows in the realm settings.
pub fn static_key_from_config(raw: &str) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
    let raw = raw.trim();
    if raw.starts_with("-----BEGIN") {
        return DecodingKey::from_rsa_pem(raw.as_bytes());
    }
    let body: String = raw.split_whitespace().collect();
    let der = base64ct::Base64::decode_vec(&body)
        .map_err(|_| jsonwebtoken::errors::Error::from(ErrorKind::InvalidKeyFormat))?;
    let pem = pem::encode(&pem::Pem::new("PUBLIC KEY", der));
    DecodingKey::from_rsa_pem(pem.as_bytes())
}

/// Verifies Keycloak access tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    settings: VerifierSettings,
    jwks: Option<JwksCache>,
    static_key: Option<DecodingKey>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self {
            settings,
            jwks: None,
            static_key: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_jwks(mut self, jwks: JwksCache) -> Self {
        self.jwks = Some(jwks);
        self
    }

    pub fn with_static_key(mut self, key: DecodingKey) -> Self {
        self.static_key = Some(key);
        self
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    pub fn jwks(&self) -> Option<&JwksCache> {
        self.jwks.as_ref()
    }

    pub fn has_static_key(&self) -> bool {
        self.static_key.is_some()
    }

    /// Verify a raw bearer token.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let header = decode_raw_header(token)?;
        if header.alg != PINNED_ALGORITHM {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let key = self.resolve_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.settings.leeway_secs;
        validation.validate_nbf = true;
        // issuer and audience rules are stricter than jsonwebtoken's, see below
        validation.validate_aud = false;

        let claims = decode::<TokenClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => {
                    AuthError::UnsupportedAlgorithm(PINNED_ALGORITHM.to_string())
                }
                _ => AuthError::MalformedToken,
            })?
            .claims;

        self.check_issued_at(&claims)?;

        if claims.iss != self.settings.issuer {
            return Err(AuthError::InvalidIssuer);
        }

        if !self.audience_accepted(&claims) {
            return Err(AuthError::InvalidAudience);
        }

        Ok(VerifiedClaims::new(claims, &self.settings.role_clients))
    }

    /// JWKS first (when enabled and the token names a key), then the static
    /// key. No key at all fails closed.
    async fn resolve_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        if let (true, Some(jwks), Some(kid)) = (
            self.settings.use_jwks,
            self.jwks.as_ref(),
            kid.filter(|k| !k.is_empty()),
        ) {
            match jwks.decoding_key(kid).await {
                Ok(Some(key)) => return Ok(key),
                Ok(None) => debug!(kid, "No JWKS entry for kid, using static key"),
                Err(e) if self.static_key.is_some() => {
                    warn!(error = %e, "JWKS unavailable, falling back to static key");
                }
                Err(e) => return Err(e),
            }
        }

        self.static_key.clone().ok_or(AuthError::NoMatchingKey)
    }

    fn check_issued_at(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        let now = self.clock.now().timestamp();
        match claims.iat {
            Some(iat) if iat > now + self.settings.leeway_secs as i64 => {
                Err(AuthError::TokenNotYetValid)
            }
            _ => Ok(()),
        }
    }

    fn audience_accepted(&self, claims: &TokenClaims) -> bool {
        let allowed = &self.settings.allowed_audiences;
        if allowed.is_empty() {
            return true;
        }
        let aud_ok = claims.aud.iter().any(|a| allowed.iter().any(|x| x == a));
        let azp_ok = claims
            .azp
            .as_deref()
            .filter(|azp| !azp.is_empty())
            .map(|azp| allowed.iter().any(|x| x == azp))
            .unwrap_or(false);
        aud_ok || azp_ok
    }
}

fn decode_raw_header(token: &str) -> Result<RawHeader, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::MalformedToken);
    }
    let bytes =
        Base64UrlUnpadded::decode_vec(segments[0]).map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::jwks::tests::StaticSource;
    use crate::clock::ManualClock;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    pub(crate) const ISSUER: &str = "https://kc.test/realms/bank";
    pub(crate) const SIGNING_KEY_PEM: &str = include_str!("testdata/signing_key.pem");
    pub(crate) const SIGNING_PUB_PEM: &str = include_str!("testdata/signing_pub.pem");
    const ROGUE_KEY_PEM: &str = include_str!("testdata/rogue_key.pem");

    pub(crate) fn now() -> i64 {
        jsonwebtoken::get_current_timestamp() as i64
    }

    pub(crate) fn base_claims() -> Value {
        json!({
            "sub": "0b7e6a3c-2f7d-4c55-9d7e-1c2b3a4d5e6f",
            "iss": ISSUER,
            "aud": "account",
            "azp": "bank-web",
            "iat": now(),
            "exp": now() + 300,
            "realm_access": {"roles": ["Client_Bancaire"]},
        })
    }

    pub(crate) fn sign_with(pem: &str, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        encode(
            &header,
            claims,
            &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    pub(crate) fn sign(kid: Option<&str>, claims: &Value) -> String {
        sign_with(SIGNING_KEY_PEM, kid, claims)
    }

    fn static_verifier(settings: VerifierSettings) -> TokenVerifier {
        TokenVerifier::new(settings)
            .with_static_key(static_key_from_config(SIGNING_PUB_PEM).unwrap())
    }

    fn forge(header: Value, claims: &Value, signature: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string()),
            signature
        )
    }

    #[tokio::test]
    async fn accepts_token_signed_with_static_key() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));
        let verified = verifier.verify(&sign(None, &base_claims())).await.unwrap();
        assert_eq!(verified.roles, vec!["client_bancaire"]);
        assert_eq!(verified.claims.azp.as_deref(), Some("bank-web"));
    }

    #[tokio::test]
    async fn static_key_accepts_bare_base64_body() {
        let body: String = SIGNING_PUB_PEM
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        let verifier = TokenVerifier::new(VerifierSettings::new(ISSUER))
            .with_static_key(static_key_from_config(&body).unwrap());
        assert!(verifier.verify(&sign(None, &base_claims())).await.is_ok());
    }

    #[tokio::test]
    async fn resolves_key_from_jwks_by_kid() {
        let source = Arc::new(StaticSource::with_kid("rot-2"));
        let jwks = JwksCache::new(source, Arc::new(ManualClock::default()));
        let verifier = TokenVerifier::new(VerifierSettings::new(ISSUER)).with_jwks(jwks);

        assert!(verifier.verify(&sign(Some("rot-2"), &base_claims())).await.is_ok());
        // unknown kid and no static key: fail closed
        assert!(matches!(
            verifier.verify(&sign(Some("rot-3"), &base_claims())).await,
            Err(AuthError::NoMatchingKey)
        ));
    }

    #[tokio::test]
    async fn jwks_outage_falls_back_to_static_key() {
        let mut source = StaticSource::with_kid("rot-2");
        source.fail = true;
        let jwks = JwksCache::new(Arc::new(source), Arc::new(ManualClock::default()));
        let verifier = static_verifier(VerifierSettings::new(ISSUER)).with_jwks(jwks.clone());
        assert!(verifier.verify(&sign(Some("rot-2"), &base_claims())).await.is_ok());

        let no_fallback = TokenVerifier::new(VerifierSettings::new(ISSUER)).with_jwks(jwks);
        assert!(matches!(
            no_fallback.verify(&sign(Some("rot-2"), &base_claims())).await,
            Err(AuthError::JwksFetchError(_))
        ));
    }

    #[tokio::test]
    async fn jwks_disabled_skips_lookup() {
        let source = Arc::new(StaticSource::with_kid("rot-2"));
        let jwks = JwksCache::new(source.clone(), Arc::new(ManualClock::default()));
        let mut settings = VerifierSettings::new(ISSUER);
        settings.use_jwks = false;
        let verifier = static_verifier(settings).with_jwks(jwks);

        assert!(verifier.verify(&sign(Some("rot-2"), &base_claims())).await.is_ok());
        assert_eq!(source.fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejects_wrong_segment_count() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));
        assert!(matches!(verifier.verify("a.b").await, Err(AuthError::MalformedToken)));
        assert!(matches!(verifier.verify("a.b.c.d").await, Err(AuthError::MalformedToken)));
        assert!(matches!(verifier.verify("").await, Err(AuthError::MalformedToken)));
    }

    #[tokio::test]
    async fn rejects_alg_none_and_symmetric_algorithms() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));
        for alg in ["none", "None", "HS256", "HS512", "RS512", "ES256", ""] {
            for signature in ["", "c2lnbmF0dXJl"] {
                let token = forge(json!({"alg": alg, "typ": "JWT"}), &base_claims(), signature);
                assert!(
                    matches!(
                        verifier.verify(&token).await,
                        Err(AuthError::UnsupportedAlgorithm(_))
                    ),
                    "alg {alg:?} must be rejected"
                );
            }
        }
    }

    #[tokio::test]
    async fn rejects_signature_from_other_key() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));
        let token = sign_with(ROGUE_KEY_PEM, None, &base_claims());
        assert!(matches!(verifier.verify(&token).await, Err(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn rejects_expired_and_immature_tokens() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));

        let mut claims = base_claims();
        claims["exp"] = json!(now() - 120);
        assert!(matches!(
            verifier.verify(&sign(None, &claims)).await,
            Err(AuthError::TokenExpired)
        ));

        let mut claims = base_claims();
        claims["nbf"] = json!(now() + 600);
        assert!(matches!(
            verifier.verify(&sign(None, &claims)).await,
            Err(AuthError::TokenNotYetValid)
        ));

        let mut claims = base_claims();
        claims["iat"] = json!(now() + 600);
        assert!(matches!(
            verifier.verify(&sign(None, &claims)).await,
            Err(AuthError::TokenNotYetValid)
        ));
    }

    #[tokio::test]
    async fn issued_at_follows_the_injected_clock() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now() - chrono::Duration::minutes(10)));
        let verifier = static_verifier(VerifierSettings::new(ISSUER)).with_clock(clock.clone());

        // fresh by wall time, but ten minutes in the future for this clock
        let token = sign(None, &base_claims());
        assert!(matches!(verifier.verify(&token).await, Err(AuthError::TokenNotYetValid)));

        clock.advance(chrono::Duration::minutes(10));
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn leeway_tolerates_small_skew() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));
        let mut claims = base_claims();
        claims["exp"] = json!(now() - 10);
        claims["iat"] = json!(now() + 10);
        assert!(verifier.verify(&sign(None, &claims)).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_issuer_mismatch() {
        let verifier = static_verifier(VerifierSettings::new(ISSUER));
        let mut claims = base_claims();
        claims["iss"] = json!(format!("{ISSUER}/"));
        assert!(matches!(
            verifier.verify(&sign(None, &claims)).await,
            Err(AuthError::InvalidIssuer)
        ));
    }

    #[tokio::test]
    async fn audience_or_azp_must_be_allowed() {
        let mut settings = VerifierSettings::new(ISSUER);
        settings.allowed_audiences = vec!["bankaccount-api".into(), "wallet-service-client".into()];
        let verifier = static_verifier(settings);

        // neither aud nor azp allowed
        assert!(matches!(
            verifier.verify(&sign(None, &base_claims())).await,
            Err(AuthError::InvalidAudience)
        ));

        // aud intersects
        let mut claims = base_claims();
        claims["aud"] = json!(["account", "bankaccount-api"]);
        assert!(verifier.verify(&sign(None, &claims)).await.is_ok());

        // service token: no aud, azp allowed
        let mut claims = base_claims();
        claims.as_object_mut().unwrap().remove("aud");
        claims["azp"] = json!("wallet-service-client");
        assert!(verifier.verify(&sign(None, &claims)).await.is_ok());
    }

    #[tokio::test]
    async fn aggregates_configured_client_roles() {
        let mut settings = VerifierSettings::new(ISSUER);
        settings.role_clients = vec!["bankaccount-api".into()];
        let verifier = static_verifier(settings);

        let mut claims = base_claims();
        claims["resource_access"] = json!({
            "bankaccount-api": {"roles": ["AGENT_KYC", "client_bancaire"]},
            "other": {"roles": ["nope"]}
        });
        let verified = verifier.verify(&sign(None, &claims)).await.unwrap();
        assert_eq!(verified.roles, vec!["client_bancaire", "agent_kyc"]);
    }
}
