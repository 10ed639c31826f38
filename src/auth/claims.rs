// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed Keycloak claims.
//!
//! Claims are deserialized once, by the verifier, into [`TokenClaims`].
//! Keycloak is loose about shapes (`aud` and `acr` may be a string or an
//! array, `agency_id` a string or a number), so those fields go through
//! [`StringList`] / [`lenient_string`] instead of `serde_json::Value` lookups.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A claim that may be a single scalar or an array of scalars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for StringList {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Num(serde_json::Number),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Num(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<OneOrMany>::deserialize(deserializer)?;
        Ok(StringList(match raw {
            None => Vec::new(),
            Some(OneOrMany::One(s)) => vec![s.into_string()],
            Some(OneOrMany::Many(v)) => v.into_iter().map(Scalar::into_string).collect(),
        }))
    }
}

/// Accept a string or a number for an identifier-like claim.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(Scalar::into_string)
        .filter(|s| !s.is_empty()))
}

/// `{"roles": [...]}` block used by `realm_access` and `resource_access.*`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoleClaim {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims of a Keycloak access token.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenClaims {
    /// Subject (Keycloak user UUID, or service account id)
    #[serde(default)]
    pub sub: Option<String>,

    /// Issuer (`{base_url}/realms/{realm}`)
    #[serde(default)]
    pub iss: String,

    /// Audience
    #[serde(default)]
    pub aud: StringList,

    /// Authorized party (client the token was issued to)
    #[serde(default)]
    pub azp: Option<String>,

    pub exp: i64,

    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub agency_id: Option<String>,

    #[serde(default)]
    pub realm_access: Option<RoleClaim>,

    #[serde(default)]
    pub resource_access: HashMap<String, RoleClaim>,

    /// Authentication context class
    #[serde(default)]
    pub acr: StringList,

    /// Authentication methods
    #[serde(default)]
    pub amr: StringList,

    /// Device trust score pushed by the IdP, 0..100
    #[serde(default)]
    pub device_trust: Option<i64>,

    /// Risk score pushed by the IdP
    #[serde(default)]
    pub risk: Option<i64>,
}

impl TokenClaims {
    /// Realm roles plus the resource roles of each listed client.
    ///
    /// Lower-cased, deduplicated, first-seen order.
    pub fn aggregate_roles(&self, role_clients: &[String]) -> Vec<String> {
        let realm = self.realm_access.iter().flat_map(|r| r.roles.iter());
        let clients = role_clients
            .iter()
            .filter_map(|client| self.resource_access.get(client))
            .flat_map(|r| r.roles.iter());

        let mut roles: Vec<String> = Vec::new();
        for role in realm.chain(clients) {
            let role = role.trim().to_lowercase();
            if !role.is_empty() && !roles.contains(&role) {
                roles.push(role);
            }
        }
        roles
    }
}

/// Output of the token verifier: claims whose signature, lifetime, issuer
/// and audience have been checked, plus the aggregated role set.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub claims: TokenClaims,
    pub roles: Vec<String>,
}

impl VerifiedClaims {
    pub fn new(claims: TokenClaims, role_clients: &[String]) -> Self {
        let roles = claims.aggregate_roles(role_clients);
        Self { claims, roles }
    }

    /// Display identity for audit (`preferred_username`, else `sub`).
    pub fn actor_name(&self) -> Option<&str> {
        self.claims
            .preferred_username
            .as_deref()
            .or(self.claims.sub.as_deref())
    }
}
