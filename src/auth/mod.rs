// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Keycloak bearer-token authentication for the bank-account API.
//!
//! ## Auth Flow
//!
//! 1. Clients and back-office users obtain an access token from the Keycloak
//!    realm; other services use client credentials
//! 2. Requests carry `Authorization: Bearer <token>`
//! 3. The gateway:
//!    - pins RS256 and resolves the key by `kid` from the realm JWKS, falling
//!      back to the configured realm public key
//!    - verifies signature, `exp`/`nbf`/`iat` with leeway, issuer, audience
//!    - aggregates realm and selected client roles
//!
//! ## Security
//!
//! - All non-health endpoints require authentication
//! - No key, no access: a token that cannot be matched to a key is rejected
//! - JWKS is cached with a TTL and refetched on miss

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod roles;
pub mod verifier;

pub use claims::{TokenClaims, VerifiedClaims};
pub use error::AuthError;
pub use extractor::Actor;
pub use jwks::{HttpJwksSource, JwksCache, JwksSource};
pub use middleware::authenticate;
pub use roles::{require_any_role, RequiredRoles};
pub use verifier::{TokenVerifier, VerifierSettings};
