// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # CEMAC RIB validation
//!
//! A RIB (relevé d'identité bancaire) is made of four alphanumeric fields:
//!
//! | Field | Length |
//! |-------|--------|
//! | Bank code | 5 |
//! | Branch code | 5 |
//! | Account core | 11 |
//! | Check key | 2 |
//!
//! Concatenated they form the 23-character compact number. Letters are
//! transliterated to two-digit values (A=10 .. Z=35) and the resulting digit
//! string must be congruent to 0 modulo 97.
//!
//! Everything here is pure; callers decide what a failure means for the
//! request.

use std::fmt;

pub const BANK_CODE_LEN: usize = 5;
pub const BRANCH_CODE_LEN: usize = 5;
pub const ACCOUNT_CORE_LEN: usize = 11;
pub const CHECK_KEY_LEN: usize = 2;
pub const COMPACT_LEN: usize =
    BANK_CODE_LEN + BRANCH_CODE_LEN + ACCOUNT_CORE_LEN + CHECK_KEY_LEN;

const MASKED_PLACEHOLDER: &str = "********";

/// RIB validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RibError {
    #[error("invalid RIB: expected field lengths 5-5-11-2")]
    FieldLengths,

    #[error("invalid RIB: expected {COMPACT_LEN} characters, got {0}")]
    CompactLength(usize),

    #[error("invalid RIB: unexpected character {0:?}")]
    InvalidCharacter(char),

    #[error("invalid RIB: check key mismatch")]
    Checksum,
}

/// Upper-case and drop all whitespace.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Replace letters by their two-digit value; digits pass through.
///
/// Whitespace is ignored. Anything that is not an ASCII letter or digit is
/// rejected.
pub fn transliterate(s: &str) -> Result<String, RibError> {
    let mut out = String::with_capacity(s.len() * 2);
    for ch in s.chars().filter(|c| !c.is_whitespace()) {
        match ch.to_ascii_uppercase() {
            d @ '0'..='9' => out.push(d),
            l @ 'A'..='Z' => {
                let value = (l as u8 - b'A') + 10;
                out.push(char::from(b'0' + value / 10));
                out.push(char::from(b'0' + value % 10));
            }
            other => return Err(RibError::InvalidCharacter(other)),
        }
    }
    Ok(out)
}

/// Remainder of a decimal digit string modulo 97.
///
/// Streams one digit at a time so the input length is unbounded.
pub fn mod97(digits: &str) -> Result<u32, RibError> {
    digits
        .chars()
        .filter(|c| !c.is_whitespace())
        .try_fold(0u32, |acc, ch| {
            let digit = ch.to_digit(10).ok_or(RibError::InvalidCharacter(ch))?;
            Ok((acc * 10 + digit) % 97)
        })
}

/// Compute the two-digit check key for the given fields.
///
/// The result is in `"01"..="97"`. Appending it to the transliterated fields
/// yields a number divisible by 97.
pub fn compute_check_key(
    bank_code: &str,
    branch_code: &str,
    account_core: &str,
) -> Result<String, RibError> {
    let mut number = transliterate(&format!("{bank_code}{branch_code}{account_core}"))?;
    number.push_str("00");
    let key = 97 - mod97(&number)?;
    Ok(format!("{key:02}"))
}

/// Check the mod-97 invariant for detailed fields.
///
/// A key that is not exactly two digits is never valid.
pub fn is_valid(bank_code: &str, branch_code: &str, account_core: &str, check_key: &str) -> bool {
    let key = normalize(check_key);
    if key.len() != CHECK_KEY_LEN || !key.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match transliterate(&format!("{bank_code}{branch_code}{account_core}")) {
        Ok(mut number) => {
            number.push_str(&key);
            mod97(&number) == Ok(0)
        }
        Err(_) => false,
    }
}

/// Check the mod-97 invariant for a compact (23-character) number.
pub fn is_valid_compact(raw: &str) -> bool {
    StructuredAccountNumber::split_compact(raw)
        .map(|(bank, branch, core, key)| is_valid(&bank, &branch, &core, &key))
        .unwrap_or(false)
}

/// Join detailed fields into the compact form.
///
/// Fields are upper-cased and stripped of whitespace first. Lengths must be
/// exactly 5-5-11-2; nothing is truncated.
pub fn compact(
    bank_code: &str,
    branch_code: &str,
    account_core: &str,
    check_key: &str,
) -> Result<String, RibError> {
    let fields = [
        (normalize(bank_code), BANK_CODE_LEN),
        (normalize(branch_code), BRANCH_CODE_LEN),
        (normalize(account_core), ACCOUNT_CORE_LEN),
        (normalize(check_key), CHECK_KEY_LEN),
    ];
    if fields.iter().any(|(f, len)| f.chars().count() != *len) {
        return Err(RibError::FieldLengths);
    }
    Ok(fields.into_iter().map(|(f, _)| f).collect())
}

/// Normalize an already compacted number and check its length.
pub fn compact_from_raw(raw: &str) -> Result<String, RibError> {
    let number = normalize(raw);
    let len = number.chars().count();
    if len != COMPACT_LEN {
        return Err(RibError::CompactLength(len));
    }
    Ok(number)
}

/// Display form `first4****last4`, or `********` for short input.
pub fn mask(compact: &str) -> String {
    let chars: Vec<char> = compact.chars().collect();
    if chars.len() < 6 {
        return MASKED_PLACEHOLDER.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// A RIB whose field lengths, alphabet and check key have been verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructuredAccountNumber {
    bank_code: String,
    branch_code: String,
    account_core: String,
    check_key: String,
}

impl StructuredAccountNumber {
    /// Build from detailed fields, verifying the check key.
    pub fn from_parts(
        bank_code: &str,
        branch_code: &str,
        account_core: &str,
        check_key: &str,
    ) -> Result<Self, RibError> {
        let compacted = compact(bank_code, branch_code, account_core, check_key)?;
        let (bank_code, branch_code, account_core, check_key) =
            Self::split_compact(&compacted)?;
        if let Some(bad) = compacted.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(RibError::InvalidCharacter(bad));
        }
        if !is_valid(&bank_code, &branch_code, &account_core, &check_key) {
            return Err(RibError::Checksum);
        }
        Ok(Self {
            bank_code,
            branch_code,
            account_core,
            check_key,
        })
    }

    /// Build from the first three fields, computing the check key.
    pub fn with_computed_key(
        bank_code: &str,
        branch_code: &str,
        account_core: &str,
    ) -> Result<Self, RibError> {
        let key = compute_check_key(
            &normalize(bank_code),
            &normalize(branch_code),
            &normalize(account_core),
        )?;
        Self::from_parts(bank_code, branch_code, account_core, &key)
    }

    /// Parse and verify a compact number.
    pub fn parse_compact(raw: &str) -> Result<Self, RibError> {
        let (bank, branch, core, key) = Self::split_compact(raw)?;
        Self::from_parts(&bank, &branch, &core, &key)
    }

    fn split_compact(raw: &str) -> Result<(String, String, String, String), RibError> {
        let chars: Vec<char> = compact_from_raw(raw)?.chars().collect();
        let take = |from: usize, len: usize| chars[from..from + len].iter().collect::<String>();
        let branch_at = BANK_CODE_LEN;
        let core_at = branch_at + BRANCH_CODE_LEN;
        let key_at = core_at + ACCOUNT_CORE_LEN;
        Ok((
            take(0, BANK_CODE_LEN),
            take(branch_at, BRANCH_CODE_LEN),
            take(core_at, ACCOUNT_CORE_LEN),
            take(key_at, CHECK_KEY_LEN),
        ))
    }

    pub fn bank_code(&self) -> &str {
        &self.bank_code
    }

    pub fn branch_code(&self) -> &str {
        &self.branch_code
    }

    pub fn account_core(&self) -> &str {
        &self.account_core
    }

    pub fn check_key(&self) -> &str {
        &self.check_key
    }

    /// The 23-character compact form.
    pub fn compact(&self) -> String {
        format!(
            "{}{}{}{}",
            self.bank_code, self.branch_code, self.account_core, self.check_key
        )
    }

    pub fn masked(&self) -> String {
        mask(&self.compact())
    }

    /// Last four characters of the compact form, used as a claim proof.
    pub fn last4(&self) -> String {
        // fields are ASCII once validated
        let core = &self.account_core;
        format!("{}{}", &core[core.len() - 2..], self.check_key)
    }
}

impl fmt::Display for StructuredAccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reference_vector() {
        let key = compute_check_key("10907", "00629", "00123456784").unwrap();
        assert_eq!(key, "22");

        let compacted = compact("10907", "00629", "00123456784", &key).unwrap();
        assert_eq!(compacted, "10907006290012345678422");
        assert!(is_valid_compact(&compacted));
        assert!(is_valid("10907", "00629", "00123456784", "22"));
        assert!(!is_valid("10907", "00629", "00123456784", "23"));
    }

    #[test]
    fn transliterate_maps_letters() {
        assert_eq!(transliterate("A").unwrap(), "10");
        assert_eq!(transliterate("z").unwrap(), "35");
        assert_eq!(transliterate("1B 2").unwrap(), "1112");
        assert_eq!(transliterate("12-3"), Err(RibError::InvalidCharacter('-')));
    }

    #[test]
    fn alphanumeric_account_round_trips_through_key() {
        let key = compute_check_key("30005", "00001", "AB123456789").unwrap();
        assert_eq!(key, "13");
        assert!(is_valid("30005", "00001", "AB123456789", &key));
    }

    #[test]
    fn non_numeric_key_is_invalid() {
        assert!(!is_valid("10907", "00629", "00123456784", "2A"));
        assert!(!is_valid("10907", "00629", "00123456784", "222"));
    }

    #[test]
    fn compact_rejects_wrong_lengths() {
        assert_eq!(
            compact("1090", "00629", "00123456784", "22"),
            Err(RibError::FieldLengths)
        );
        assert_eq!(
            compact_from_raw("1090700629001234567842"),
            Err(RibError::CompactLength(22))
        );
        assert_eq!(
            compact_from_raw("10907 00629 00123456784 22").unwrap(),
            "10907006290012345678422"
        );
    }

    #[test]
    fn mask_short_and_long() {
        assert_eq!(mask(""), "********");
        assert_eq!(mask("12345"), "********");
        assert_eq!(mask("123456"), "1234****3456");
        assert_eq!(mask("10907006290012345678422"), "1090****8422");
    }

    #[test]
    fn structured_number_parses_compact() {
        let rib = StructuredAccountNumber::parse_compact("10907006290012345678422").unwrap();
        assert_eq!(rib.bank_code(), "10907");
        assert_eq!(rib.branch_code(), "00629");
        assert_eq!(rib.account_core(), "00123456784");
        assert_eq!(rib.check_key(), "22");
        assert_eq!(rib.masked(), "1090****8422");
        assert_eq!(rib.last4(), "8422");

        assert_eq!(
            StructuredAccountNumber::parse_compact("10907006290012345678423"),
            Err(RibError::Checksum)
        );
    }

    #[test]
    fn structured_number_computes_key() {
        let rib =
            StructuredAccountNumber::with_computed_key("10907", "00629", "00123456784").unwrap();
        assert_eq!(rib.compact(), "10907006290012345678422");
    }

    #[test]
    fn structured_number_rejects_symbols() {
        assert_eq!(
            StructuredAccountNumber::from_parts("1090*", "00629", "00123456784", "22"),
            Err(RibError::InvalidCharacter('*'))
        );
    }

    proptest! {
        #[test]
        fn computed_key_always_validates(
            bank in "[0-9A-Z]{5}",
            branch in "[0-9A-Z]{5}",
            core in "[0-9A-Z]{11}",
        ) {
            let key = compute_check_key(&bank, &branch, &core).unwrap();
            prop_assert_eq!(key.len(), 2);
            prop_assert!(is_valid(&bank, &branch, &core, &key));
            let rib = StructuredAccountNumber::from_parts(&bank, &branch, &core, &key).unwrap();
            prop_assert!(is_valid_compact(&rib.compact()));
        }

        #[test]
        fn streaming_mod97_matches_reference(digits in "[0-9]{1,38}") {
            let reference = (digits.parse::<u128>().unwrap() % 97) as u32;
            prop_assert_eq!(mod97(&digits).unwrap(), reference);
        }

        #[test]
        fn compact_and_mask_are_total_on_23_chars(raw in "[^\\s]{23}") {
            let compacted = compact_from_raw(&raw).unwrap();
            prop_assert_eq!(compacted.chars().count(), COMPACT_LEN);
            let masked = mask(&compacted);
            prop_assert_eq!(masked.chars().count(), 12);
            prop_assert!(masked.contains("****"));
        }
    }
}
