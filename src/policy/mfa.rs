// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Second-factor detection from `acr` / `amr`.

use crate::context::Subject;

/// `amr` values that prove a second factor.
pub const SECOND_FACTOR_METHODS: [&str; 6] = ["otp", "totp", "webauthn", "hwk", "sms", "email"];

/// Authentication evidence carried by the token.
#[derive(Debug, Clone, Copy)]
pub struct MfaEvidence<'a> {
    pub acr_primary: Option<&'a str>,
    pub acr_list: &'a [String],
    pub amr_list: &'a [String],
}

impl<'a> MfaEvidence<'a> {
    pub fn from_subject(subject: &'a Subject) -> Self {
        Self {
            acr_primary: subject.acr.first().map(String::as_str),
            acr_list: &subject.acr,
            amr_list: &subject.amr,
        }
    }

    /// `acr == "mfa"`, a numeric `acr >= 2`, or a second-factor `amr`.
    pub fn has_second_factor(&self) -> bool {
        let strong_acr = |acr: &str| {
            let acr = acr.trim();
            acr.eq_ignore_ascii_case("mfa")
                || (!acr.is_empty()
                    && acr.bytes().all(|b| b.is_ascii_digit())
                    && acr.parse::<u64>().map(|level| level >= 2).unwrap_or(true))
        };

        self.acr_primary.is_some_and(strong_acr)
            || self.acr_list.iter().any(|a| strong_acr(a))
            || self.amr_list.iter().any(|m| {
                SECOND_FACTOR_METHODS
                    .iter()
                    .any(|f| m.trim().eq_ignore_ascii_case(f))
            })
    }
}
