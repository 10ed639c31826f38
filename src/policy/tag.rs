// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Route sensitivity labels.

use std::fmt;
use std::str::FromStr;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};

/// Sensitivity of a route group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceTag {
    #[default]
    General,
    Pii,
    Financial,
}

impl ResourceTag {
    /// Lenient parse: case-insensitive, unknown labels are `General`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceTag::General => "GENERAL",
            ResourceTag::Pii => "PII",
            ResourceTag::Financial => "FINANCIAL",
        }
    }
}

impl FromStr for ResourceTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERAL" => Ok(ResourceTag::General),
            "PII" => Ok(ResourceTag::Pii),
            "FINANCIAL" => Ok(ResourceTag::Financial),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attaches the route group's tag, used with
/// `from_fn_with_state(ResourceTag::Financial, tag_resource)`.
pub async fn tag_resource(State(tag): State<ResourceTag>, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(tag);
    next.run(request).await
}
