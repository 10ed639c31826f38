// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bank Account Gateway - Zero-Trust Provisioning Service
//!
//! Authorization pipeline in front of the bank-account provisioning API,
//! plus the CEMAC RIB mod-97 validator.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers and router (Axum)
//! - `auth` - Keycloak token verification and role gate
//! - `context` - Subject and request context projection
//! - `policy` - Resource tags, policy decision point, audit sink
//! - `idempotency` - At-most-once admission of mutating requests
//! - `rib` - RIB structure and check key
//! - `providers` - Outbound service clients

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod http_client;
pub mod idempotency;
pub mod logging;
pub mod models;
pub mod policy;
pub mod providers;
pub mod rib;
pub mod state;
pub mod store;
