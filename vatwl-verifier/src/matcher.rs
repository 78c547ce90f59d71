//! Whitelist checks against a loaded snapshot.
//!
//! A query is hashed as `yyyymmdd + NIP + account`, first with the account as
//! given and then with each mask applied to it. The first digest found in the
//! snapshot's index is a hit.

use std::fmt;

use chrono::NaiveDate;

use crate::digest::{iterated_digest, to_hex};
use crate::mask::{ACCOUNT_LEN, AccountNumber};
use crate::snapshot::{Snapshot, date_stamp};

/// Strips everything but ASCII digits. Returns `None` if nothing is left.
pub fn normalize_digits(s: &str) -> Option<String> {
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// A non-empty, digits-only tax identifier (NIP).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxId(String);

impl TaxId {
    pub fn parse(digits: &str) -> Option<Self> {
        (!digits.is_empty() && digits.bytes().all(|c| c.is_ascii_digit()))
            .then(|| Self(digits.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a whitelist check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub hit: bool,
    /// Hex digest that was found in the snapshot.
    pub used_hash: Option<String>,
    /// The preimage behind `used_hash`, or `date + tax id` on a miss.
    pub used_input: String,
    /// `used_hash` on a hit, otherwise the digest of `date + tax id`. Meant for
    /// audit trails; it is never itself looked up.
    pub audit_hash: String,
}

/// Checks tax identifiers and accounts against a loaded [`Snapshot`].
pub struct WhitelistChecker<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> WhitelistChecker<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    /// Decides whether `tax_id` (with `account`, if any) is on the whitelist
    /// for `date`.
    ///
    /// The account is hashed as-is first, then through each mask in order.
    /// The first hit wins. Without an account nothing can hit.
    pub fn check(
        &self,
        date: NaiveDate,
        tax_id: &TaxId,
        account: Option<&AccountNumber>,
    ) -> MatchResult {
        let prefix = format!("{}{}", date_stamp(date), tax_id);

        if let Some(account) = account {
            if let Some(hit) = self.check_account(&prefix, account) {
                return hit;
            }
        }

        let audit_hash = to_hex(&iterated_digest(&prefix, self.snapshot.iterations()));
        MatchResult { hit: false, used_hash: None, used_input: prefix, audit_hash }
    }

    fn check_account(&self, prefix: &str, account: &AccountNumber) -> Option<MatchResult> {
        let mut input = String::with_capacity(prefix.len() + ACCOUNT_LEN);
        input.push_str(prefix);
        input.push_str(account.as_str());
        if let Some(hit) = self.try_input(&input) {
            return Some(hit);
        }

        for mask in self.snapshot.masks() {
            let Some(masked) = mask.apply(account) else {
                continue;
            };
            input.truncate(prefix.len());
            // apply() only emits digits and 'X'.
            input.extend(masked.iter().map(|b| *b as char));
            if let Some(hit) = self.try_input(&input) {
                return Some(hit);
            }
        }

        None
    }

    #[inline]
    fn try_input(&self, input: &str) -> Option<MatchResult> {
        let digest = iterated_digest(input, self.snapshot.iterations());
        if !self.snapshot.hashes().contains(&digest) {
            return None;
        }
        let hash = to_hex(&digest);
        Some(MatchResult {
            hit: true,
            used_hash: Some(hash.clone()),
            used_input: input.to_owned(),
            audit_hash: hash,
        })
    }
}
