// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end tests through the full router: correlation id, token
//! verification, context, policy, role gate, idempotency and handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use bankaccount_gateway::{
    api::router,
    auth::{verifier::static_key_from_config, TokenVerifier, VerifierSettings},
    clock::SystemClock,
    config::Settings,
    policy::{AuditEventType, MemoryAuditSink},
    providers::{CeilingsApi, UpstreamError, UserDirectory},
    state::AppState,
};

const SIGNING_KEY_PEM: &str = include_str!("../src/auth/testdata/signing_key.pem");
const SIGNING_PUB_PEM: &str = include_str!("../src/auth/testdata/signing_pub.pem");

const BASE_URL: &str = "https://kc.test";
const ISSUER: &str = "https://kc.test/realms/bank";

const CUSTOMER: &str = "0b7e6a3c-2f7d-4c55-9d7e-1c2b3a4d5e6f";
const OTHER_CUSTOMER: &str = "5d1c8f0e-7a34-4b8e-a1f2-9e8d7c6b5a40";
const UNKNOWN_USER: &str = "9a9a9a9a-0000-4000-8000-000000000000";

#[derive(Default)]
struct RecordingCeilings {
    calls: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl CeilingsApi for RecordingCeilings {
    async fn ensure_default(
        &self,
        external_id: &str,
        currency: Option<&str>,
        _request_id: Option<&str>,
    ) -> Result<(), UpstreamError> {
        self.calls
            .lock()
            .unwrap()
            .push((external_id.to_string(), currency.map(str::to_string)));
        Ok(())
    }
}

struct KnownUsers;

#[async_trait]
impl UserDirectory for KnownUsers {
    async fn assert_user_exists(&self, external_id: &str) -> Result<(), UpstreamError> {
        if external_id == UNKNOWN_USER {
            Err(UpstreamError::UserNotFound)
        } else {
            Ok(())
        }
    }
}

struct Harness {
    app: Router,
    audit: Arc<MemoryAuditSink>,
    ceilings: Arc<RecordingCeilings>,
}

fn harness_with(vars: &[(&str, &str)]) -> Harness {
    let mut env: HashMap<String, String> = HashMap::from([
        ("KEYCLOAK_BASE_URL".to_string(), BASE_URL.to_string()),
        ("KEYCLOAK_REALM".to_string(), "bank".to_string()),
        ("KEYCLOAK_USE_JWKS".to_string(), "false".to_string()),
    ]);
    for (k, v) in vars {
        env.insert(k.to_string(), v.to_string());
    }
    let settings = Settings::from_lookup(|name| env.get(name).cloned()).unwrap();

    let mut verifier_settings = VerifierSettings::new(settings.issuer());
    verifier_settings.use_jwks = false;
    let verifier = TokenVerifier::new(verifier_settings)
        .with_static_key(static_key_from_config(SIGNING_PUB_PEM).unwrap());

    let audit = Arc::new(MemoryAuditSink::new());
    let ceilings = Arc::new(RecordingCeilings::default());
    let state = AppState::new(settings, verifier, Arc::new(SystemClock))
        .with_audit(audit.clone())
        .with_ceilings(ceilings.clone())
        .with_users(Arc::new(KnownUsers));

    Harness {
        app: router(state),
        audit,
        ceilings,
    }
}

fn harness() -> Harness {
    harness_with(&[])
}

fn now() -> i64 {
    jsonwebtoken::get_current_timestamp() as i64
}

fn token_with(sub: &str, roles: &[&str], extra: Value) -> String {
    let mut claims = json!({
        "sub": sub,
        "iss": ISSUER,
        "aud": "account",
        "azp": "bank-web",
        "preferred_username": format!("user-{}", &sub[..8]),
        "iat": now(),
        "exp": now() + 300,
        "realm_access": {"roles": roles},
    });
    if let (Some(base), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

fn token(sub: &str, roles: &[&str]) -> String {
    token_with(sub, roles, json!({}))
}

fn agent_token() -> String {
    token("a9e4c2d1-1111-4222-8333-444455556666", &["agent_kyc"])
}

fn request(method: Method, uri: &str, bearer: Option<&str>, key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", format!("Bearer {bearer}"));
    }
    if let Some(key) = key {
        builder = builder.header("idempotency-key", key);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn provision_body() -> Value {
    json!({
        "code_banque": "10907",
        "code_agence": "00629",
        "numero_compte_core": "00123456784",
        "banque_nom": "Afriland First Bank",
        "intitule": "Compte courant"
    })
}

async fn provision(h: &Harness, body: Value, key: &str) -> (StatusCode, Value) {
    send(
        &h.app,
        request(Method::POST, "/api/admin/bank-accounts", Some(&agent_token()), Some(key), Some(body)),
    )
    .await
}

#[tokio::test]
async fn public_routes_need_no_token_and_echo_request_id() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .header("x-request-id", "corr-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "corr-123");

    let (status, doc) = send(&h.app, request(Method::GET, "/api-doc/openapi.json", None, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/admin/bank-accounts"].is_object());
}

#[tokio::test]
async fn readiness_reports_static_key_without_jwks() {
    let h = harness();
    let (status, body) = send(&h.app, request(Method::GET, "/health/ready", None, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["jwks"], "disabled");
    assert_eq!(body["checks"]["static_key"], "ok");
    assert_eq!(body["checks"]["service_credentials"], "missing");
}

#[tokio::test]
async fn missing_or_forged_tokens_are_rejected() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(request(Method::GET, "/api/bank-accounts", None, None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // generated when the caller sent none
    assert!(response.headers().contains_key("x-request-id"));

    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({"sub": CUSTOMER, "iss": ISSUER, "exp": now() + 300}).to_string());
    let unsigned = format!("{header}.{claims}.");
    let (status, body) = send(&h.app, request(Method::GET, "/api/bank-accounts", Some(&unsigned), None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unsupported_algorithm");

    let (status, _) = send(
        &h.app,
        request(
            Method::GET,
            "/api/bank-accounts",
            Some(&token_with(CUSTOMER, &["client_bancaire"], json!({"iss": "https://evil.test/realms/bank"}))),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provisioning_is_admitted_once_per_key() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        request(Method::POST, "/api/admin/bank-accounts", Some(&agent_token()), None, Some(provision_body())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Idempotency-Key required");

    let (status, body) = provision(&h, provision_body(), "prov-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Compte bancaire provisionné");
    assert_eq!(body["data"]["numero_compte"], "10907006290012345678422");
    assert_eq!(body["data"]["numero_compte_masque"], "1090****8422");
    assert_eq!(body["data"]["statut"], "pre_associe");

    let (status, body) = provision(&h, provision_body(), "prov-1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Duplicate operation");

    let (status, body) = provision(&h, provision_body(), "prov-2").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Bank account already exists");

    let provisioned = h.audit.of_type(AuditEventType::AccountProvisioned);
    assert_eq!(provisioned.len(), 1);
    assert_eq!(provisioned[0].details["numero_compte"], "10907006290012345678422");
    assert!(h.ceilings.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn provisioning_validates_rib_and_owner() {
    let h = harness();

    let mut bad_key = provision_body();
    bad_key["cle_rib"] = json!("23");
    let (status, body) = provision(&h, bad_key, "k-1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "RIB invalide");

    let mut unknown_owner = provision_body();
    unknown_owner["external_id"] = json!(UNKNOWN_USER);
    let (status, _) = provision(&h, unknown_owner, "k-2").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut owned = provision_body();
    owned["cle_rib"] = json!("22");
    owned["external_id"] = json!(CUSTOMER);
    let (status, body) = provision(&h, owned, "k-3").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["statut"], "inactif");
    assert_eq!(
        h.ceilings.calls.lock().unwrap().as_slice(),
        &[(CUSTOMER.to_string(), Some("XAF".to_string()))]
    );
}

#[tokio::test]
async fn agency_scoped_roles_stay_in_their_agency() {
    let h = harness();
    let director = token_with(
        "d1d1d1d1-2222-4333-8444-555566667777",
        &["agent_kyc", "directeur_agence"],
        json!({"agency_id": "AG-01"}),
    );
    let mut body = provision_body();
    body["agency_id"] = json!("AG-02");
    let (status, body) = send(
        &h.app,
        request(Method::POST, "/api/admin/bank-accounts", Some(&director), Some("a-1"), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden - Cross-agency action");
}

#[tokio::test]
async fn customer_claims_then_reads_account() {
    let h = harness();
    let (status, created) = provision(&h, provision_body(), "prov").await;
    assert_eq!(status, StatusCode::CREATED);
    let account_id = created["data"]["id"].as_str().unwrap().to_string();

    let customer = token(CUSTOMER, &["client_bancaire"]);
    let claim = |last4: &str, numero: &str| {
        json!({"numero_compte": numero, "preuves": {"last4": last4}})
    };

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/bank-accounts/claim",
            Some(&customer),
            Some("c-0"),
            Some(claim("8422", "10907 00629 99999999999 01")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Demande reçue");
    assert!(body.get("data").is_none());

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/bank-accounts/claim",
            Some(&customer),
            Some("c-1"),
            Some(claim("1234", "10907 00629 00123456784 22")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Preuves insuffisantes (last4)");

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/bank-accounts/claim",
            Some(&customer),
            Some("c-2"),
            Some(claim("8422", "10907 00629 00123456784 22")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Compte associé avec succès");
    assert_eq!(body["data"]["statut"], "verifie");
    assert_eq!(body["data"]["external_id"], CUSTOMER);
    assert_eq!(h.audit.of_type(AuditEventType::AccountClaimed).len(), 1);

    let (status, body) = send(
        &h.app,
        request(Method::GET, "/api/bank-accounts?verified=true", Some(&customer), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["meta"]["verified_count"], 1);
    assert_eq!(body["data"][0]["statut_label"], "Vérifié");
    assert_eq!(body["data"][0]["is_active"], true);

    let uri = format!("/api/bank-accounts/{account_id}");
    let (status, body) = send(&h.app, request(Method::GET, &uri, Some(&customer), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], account_id.as_str());

    let other = token(OTHER_CUSTOMER, &["client_bancaire"]);
    let (status, body) = send(&h.app, request(Method::GET, &uri, Some(&other), None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Compte non trouvé");

    // already bound: a second claimant learns nothing
    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/bank-accounts/claim",
            Some(&other),
            Some("c-3"),
            Some(claim("8422", "10907006290012345678422")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Demande reçue");
}

#[tokio::test]
async fn role_gate_runs_after_policy() {
    let h = harness();
    let customer = token(CUSTOMER, &["client_bancaire"]);
    let (status, body) = send(
        &h.app,
        request(Method::POST, "/api/admin/bank-accounts", Some(&customer), Some("r-1"), Some(provision_body())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access Denied - Missing role");
    assert_eq!(body["required_roles"], json!(["admin", "agent_kyc"]));

    // the PDP saw and allowed the request before the gate refused it
    let decisions = h.audit.of_type(AuditEventType::PolicyDecision);
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].success);
}

#[tokio::test]
async fn financial_writes_require_mfa_when_enabled() {
    let h = harness_with(&[("PDP_REQUIRE_MFA_FOR_ADMIN_FINANCIAL_WRITES", "true")]);

    let (status, body) = provision(&h, provision_body(), "m-1").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");
    assert_eq!(body["reason"], "mfa_required_on_financial_write");
    assert_eq!(body["obligation"], json!({"type": "mfa", "params": {"acr_values": "mfa"}}));

    let stepped_up = token_with(
        "a9e4c2d1-1111-4222-8333-444455556666",
        &["agent_kyc"],
        json!({"amr": ["pwd", "otp"]}),
    );
    let (status, _) = send(
        &h.app,
        request(Method::POST, "/api/admin/bank-accounts", Some(&stepped_up), Some("m-2"), Some(provision_body())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // trusted service client skips the step-up rule
    let service = token_with(
        "svc-backoffice",
        &["agent_kyc"],
        json!({"azp": "backoffice-service"}),
    );
    let mut body = provision_body();
    body["numero_compte_core"] = json!("00000000001");
    let (status, _) = send(
        &h.app,
        request(Method::POST, "/api/admin/bank-accounts", Some(&service), Some("m-3"), Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn back_office_links_account_to_customer() {
    let h = harness();
    let (_, created) = provision(&h, provision_body(), "prov").await;
    let account_id = created["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/admin/bank-accounts/{account_id}/link");

    let (status, _) = send(
        &h.app,
        request(
            Method::POST,
            &uri,
            Some(&agent_token()),
            Some("l-1"),
            Some(json!({"external_id": UNKNOWN_USER})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/admin/bank-accounts/6f1c1c1c-0000-4000-8000-000000000000/link",
            Some(&agent_token()),
            Some("l-2"),
            Some(json!({"external_id": CUSTOMER})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Compte introuvable");

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            &uri,
            Some(&agent_token()),
            Some("l-3"),
            Some(json!({"external_id": CUSTOMER, "agency_id": "AG-07"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["statut"], "verifie");
    assert_eq!(body["data"]["external_id"], CUSTOMER);

    let linked = h.audit.of_type(AuditEventType::AccountLinked);
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].details["agency_id"], "AG-07");
    assert_eq!(h.ceilings.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn internal_status_probe() {
    let h = harness();
    let mut owned = provision_body();
    owned["external_id"] = json!(CUSTOMER);
    owned["verify"] = json!(true);
    let (status, _) = provision(&h, owned, "prov").await;
    assert_eq!(status, StatusCode::CREATED);

    let service = token("svc-bankaccount", &["svc_bankaccount"]);
    let uri = format!("/api/internal/accounts/status/{CUSTOMER}");
    let (status, body) = send(&h.app, request(Method::GET, &uri, Some(&service), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"external_id": CUSTOMER, "verified": true, "counts": {"verified": 1}}));

    let (status, _) = send(
        &h.app,
        request(Method::GET, "/api/internal/accounts/status/not-a-uuid", Some(&service), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let customer = token(CUSTOMER, &["client_bancaire"]);
    let (status, _) = send(&h.app, request(Method::GET, &uri, Some(&customer), None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the probe bypasses the PDP entirely
    assert_eq!(h.audit.of_type(AuditEventType::PolicyDecision).len(), 1);
}

#[tokio::test]
async fn owner_ids_match_whatever_their_case() {
    let h = harness();
    let upper = CUSTOMER.to_uppercase();
    let mut owned = provision_body();
    owned["external_id"] = json!(upper);
    owned["verify"] = json!(true);
    let (status, created) = provision(&h, owned, "prov-upper").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["external_id"], CUSTOMER);
    assert_eq!(h.ceilings.calls.lock().unwrap()[0].0, CUSTOMER);

    let service = token("svc-bankaccount", &["svc_bankaccount"]);
    let uri = format!("/api/internal/accounts/status/{upper}");
    let (status, body) = send(&h.app, request(Method::GET, &uri, Some(&service), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["counts"]["verified"], 1);

    let customer = token(CUSTOMER, &["client_bancaire"]);
    let (status, body) = send(
        &h.app,
        request(Method::GET, "/api/bank-accounts", Some(&customer), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["meta"]["verified_count"], 1);
}
