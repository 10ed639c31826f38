// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Settings are read once from the environment at startup into [`Settings`].
//! Invalid values abort startup with a [`ConfigError`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `APP_ENV` | `production` disables the `X-Debug-Hour` override | `production` |
//! | `KEYCLOAK_BASE_URL` | Keycloak root URL | Required |
//! | `KEYCLOAK_REALM` | Realm name; issuer is `{base}/realms/{realm}` | `sara-realm` |
//! | `KEYCLOAK_ALLOWED_AUDIENCES` | Accepted `aud`/`azp` values (csv) | empty (no check) |
//! | `KEYCLOAK_USE_JWKS` | Resolve keys from the realm JWKS | `true` |
//! | `KEYCLOAK_JWKS_TTL` | JWKS cache lifetime, seconds | `300` |
//! | `KEYCLOAK_LEEWAY` | Clock skew tolerance, seconds | `30` |
//! | `KEYCLOAK_PUBLIC_KEY` | Static realm key (PEM or base64 body) | Optional |
//! | `KEYCLOAK_RESOURCE_ROLE_CLIENTS` | Clients whose roles are merged (csv) | empty |
//! | `KEYCLOAK_CLIENT_ID` | Client id for service tokens | empty |
//! | `KEYCLOAK_CLIENT_SECRET` | Client secret for service tokens | Optional |
//! | `HTTP_TIMEOUT` | Outbound request timeout, seconds | `20` |
//! | `PDP_SERVICE_BYPASS_AZP` | Trusted service clients (csv) | see [`DEFAULT_SERVICE_BYPASS_AZP`] |
//! | `PDP_ADMIN_BYPASS_ROLES` | Roles that skip the PDP rules (csv) | see [`DEFAULT_ADMIN_BYPASS_ROLES`] |
//! | `PDP_REQUIRE_MFA_FOR_ADMIN_FINANCIAL_WRITES` | Step-up on financial writes | `false` |
//! | `PDP_FINANCIAL_MIN_DEVICE_TRUST` | Minimum device trust, 0 disables | `0` |
//! | `IDEMPOTENCY_TTL` | Admission window, seconds (at most 30 days) | `600` |
//! | `USER_CEILING_URL` | UserCeiling base URL | `http://127.0.0.1:8081` |
//! | `USER_MANAGEMENT_URL` | User management base URL | `http://127.0.0.1:8001` |
//! | `SKIP_UM_CHECK` | Skip the owner existence check on provisioning | `false` |
//! | `HASH_PEPPER` | HMAC key for national ids | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::logging::LogFormat;
use crate::models::parse_lenient_bool;
use crate::policy::PolicyConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REALM: &str = "sara-realm";
/// Upper bound for `IDEMPOTENCY_TTL` (30 days).
pub const MAX_IDEMPOTENCY_TTL_SECS: u64 = 30 * 24 * 3600;
pub const DEFAULT_USER_CEILING_URL: &str = "http://127.0.0.1:8081";
pub const DEFAULT_USER_MANAGEMENT_URL: &str = "http://127.0.0.1:8001";

pub const DEFAULT_ADMIN_BYPASS_ROLES: [&str; 7] = [
    "admin",
    "superadmin",
    "bo_admin",
    "bo_superadmin",
    "svc_ceiling",
    "svc_wallet",
    "svc_bankaccount",
];

pub const DEFAULT_SERVICE_BYPASS_AZP: [&str; 5] = [
    "wallet-service-client",
    "backoffice-service",
    "userceiling-service-client",
    "bankaccount-service-client",
    "userm-service-client",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Typed runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub production: bool,
    pub keycloak_base_url: String,
    pub keycloak_realm: String,
    pub allowed_audiences: Vec<String>,
    pub use_jwks: bool,
    pub jwks_ttl: Duration,
    pub leeway_secs: u64,
    pub public_key: Option<String>,
    pub role_clients: Vec<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub http_timeout: Duration,
    pub policy: PolicyConfig,
    pub idempotency_ttl: Duration,
    pub user_ceiling_url: String,
    pub user_management_url: String,
    pub skip_um_check: bool,
    pub hash_pepper: Option<String>,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let keycloak_base_url = get("KEYCLOAK_BASE_URL")
            .ok_or(ConfigError::Missing("KEYCLOAK_BASE_URL"))
            .and_then(|v| base_url("KEYCLOAK_BASE_URL", v))?;

        let policy = PolicyConfig {
            service_bypass_azp: get("PDP_SERVICE_BYPASS_AZP")
                .map(|v| csv(&v))
                .unwrap_or_else(|| lower_all(&DEFAULT_SERVICE_BYPASS_AZP)),
            admin_bypass_roles: get("PDP_ADMIN_BYPASS_ROLES")
                .map(|v| csv(&v))
                .unwrap_or_else(|| lower_all(&DEFAULT_ADMIN_BYPASS_ROLES)),
            require_mfa_for_financial_writes: get("PDP_REQUIRE_MFA_FOR_ADMIN_FINANCIAL_WRITES")
                .map(|v| parse_lenient_bool(&v))
                .unwrap_or(false),
            financial_min_device_trust: parsed::<u8>(&get, "PDP_FINANCIAL_MIN_DEVICE_TRUST")?
                .unwrap_or(0)
                .min(100),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parsed(&get, "PORT")?.unwrap_or(DEFAULT_PORT),
            production: get("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod"))
                .unwrap_or(true),
            keycloak_base_url,
            keycloak_realm: get("KEYCLOAK_REALM").unwrap_or_else(|| DEFAULT_REALM.to_string()),
            allowed_audiences: get("KEYCLOAK_ALLOWED_AUDIENCES").map(|v| csv_raw(&v)).unwrap_or_default(),
            use_jwks: get("KEYCLOAK_USE_JWKS").map(|v| parse_lenient_bool(&v)).unwrap_or(true),
            jwks_ttl: Duration::from_secs(parsed(&get, "KEYCLOAK_JWKS_TTL")?.unwrap_or(300)),
            leeway_secs: parsed(&get, "KEYCLOAK_LEEWAY")?.unwrap_or(30),
            public_key: get("KEYCLOAK_PUBLIC_KEY"),
            role_clients: get("KEYCLOAK_RESOURCE_ROLE_CLIENTS").map(|v| csv_raw(&v)).unwrap_or_default(),
            client_id: get("KEYCLOAK_CLIENT_ID").unwrap_or_default(),
            client_secret: get("KEYCLOAK_CLIENT_SECRET"),
            http_timeout: Duration::from_secs(parsed(&get, "HTTP_TIMEOUT")?.unwrap_or(20)),
            policy,
            idempotency_ttl: Duration::from_secs(
                parsed(&get, "IDEMPOTENCY_TTL")?
                    .map(|secs: u64| bounded("IDEMPOTENCY_TTL", secs, MAX_IDEMPOTENCY_TTL_SECS))
                    .transpose()?
                    .unwrap_or(600),
            ),
            user_ceiling_url: base_url(
                "USER_CEILING_URL",
                get("USER_CEILING_URL").unwrap_or_else(|| DEFAULT_USER_CEILING_URL.to_string()),
            )?,
            user_management_url: base_url(
                "USER_MANAGEMENT_URL",
                get("USER_MANAGEMENT_URL").unwrap_or_else(|| DEFAULT_USER_MANAGEMENT_URL.to_string()),
            )?,
            skip_um_check: get("SKIP_UM_CHECK").map(|v| parse_lenient_bool(&v)).unwrap_or(false),
            hash_pepper: get("HASH_PEPPER"),
            log_format: match get("LOG_FORMAT") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: raw,
                })?,
                None => LogFormat::default(),
            },
        })
    }

    /// Expected token issuer.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.keycloak_base_url, self.keycloak_realm)
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            name: "HOST",
            value: self.host.clone(),
        })
    }
}

fn parsed<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(None),
    }
}

fn bounded(name: &'static str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value > max {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Absolute http(s) URL, stored without a trailing slash.
fn base_url(name: &'static str, raw: String) -> Result<String, ConfigError> {
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            Ok(raw.trim_end_matches('/').to_string())
        }
        _ => Err(ConfigError::Invalid { name, value: raw }),
    }
}

/// Comma-separated, trimmed, lower-cased.
fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Comma-separated, trimmed, case kept.
fn csv_raw(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn lower_all(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}
