// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing subscriber set-up and masking of sensitive values.

use std::str::FromStr;

use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Keys whose values never reach the logs in clear. Matched as whole keys,
/// case-insensitively, with `-` read as `_`.
const SENSITIVE_KEYS: [&str; 21] = [
    "authorization",
    "token",
    "access_token",
    "refresh_token",
    "id_token",
    "password",
    "secret",
    "client_secret",
    "otp",
    "totp",
    "code",
    "pin",
    "phone",
    "phone_number",
    "telephone",
    "telephone_reference",
    "email",
    "fp",
    "fingerprint",
    "identifiant_national",
    "national_id",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" | "" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Install the global subscriber. Panics if one is already installed.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => builder.json().flatten_event(true).init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.trim().to_ascii_lowercase().replace('-', "_");
    SENSITIVE_KEYS.contains(&key.as_str())
}

/// Scalars keep their masked text form; containers are dropped whole.
fn mask_any(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(mask_value(s)),
        Value::Number(n) => Value::String(mask_value(&n.to_string())),
        Value::Bool(b) => Value::String(mask_value(&b.to_string())),
        Value::Array(_) | Value::Object(_) => Value::String("[redacted]".to_string()),
    }
}

/// `ab****1234`; values of six characters or fewer are fully starred.
pub fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= 6 {
        return "*".repeat(len);
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[len - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(len - 6))
}

/// Mask values under sensitive keys, recursively.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) { mask_any(v) } else { redact_json(v) };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}

/// Redact a response body for logging; non-JSON bodies are truncated.
pub fn redact_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => redact_json(&value).to_string(),
        Err(_) => body.chars().take(256).collect(),
    }
}
