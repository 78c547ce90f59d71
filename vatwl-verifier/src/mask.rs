//! Virtual account masks.
//!
//! A mask is 26 characters over `0-9`, `X` and `Y`, one per position of a
//! Polish NRB account number:
//!
//! - a digit is a constraint: the account must carry that digit there,
//! - `Y` copies the account's digit into the hashed string,
//! - `X` puts a literal `X` into the hashed string whatever the account holds.
//!
//! Positions 2..10 hold the bank's sort code and are checked before anything
//! else, so most masks are rejected after comparing eight bytes.

use std::fmt;

/// Length of an NRB account number and of every mask.
pub const ACCOUNT_LEN: usize = 26;

/// Byte range of the eight digit bank sort code inside an account number.
pub const BANK_SEGMENT: std::ops::Range<usize> = 2..10;

/// A 26 digit account number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountNumber([u8; ACCOUNT_LEN]);

impl AccountNumber {
    /// Accepts exactly 26 ASCII digits. Anything else is treated by callers as
    /// "no account".
    pub fn parse(digits: &str) -> Option<Self> {
        let bytes: [u8; ACCOUNT_LEN] = digits.as_bytes().try_into().ok()?;
        bytes.iter().all(u8::is_ascii_digit).then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII digits ever get in.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated account mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountMask([u8; ACCOUNT_LEN]);

impl AccountMask {
    /// Parses a mask, returning `None` for the wrong length or any character
    /// outside `0-9XY`. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; ACCOUNT_LEN] = s.trim().as_bytes().try_into().ok()?;
        bytes
            .iter()
            .all(|c| c.is_ascii_digit() || *c == b'X' || *c == b'Y')
            .then_some(Self(bytes))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Returns true if every digit literal in the bank segment equals the
    /// account's digit at that position.
    #[inline]
    pub fn bank_segment_matches(&self, account: &AccountNumber) -> bool {
        self.constraints_hold(account, BANK_SEGMENT)
    }

    /// Transforms `account` for hashing, or returns `None` if the mask does
    /// not apply to it.
    ///
    /// The bank segment is checked first, then the remaining digit literals.
    pub fn apply(&self, account: &AccountNumber) -> Option<[u8; ACCOUNT_LEN]> {
        if !self.bank_segment_matches(account) {
            return None;
        }
        if !self.constraints_hold(account, 0..BANK_SEGMENT.start)
            || !self.constraints_hold(account, BANK_SEGMENT.end..ACCOUNT_LEN)
        {
            return None;
        }

        let mut out = [0u8; ACCOUNT_LEN];
        for (pos, (m, a)) in self.0.iter().zip(account.as_bytes()).enumerate() {
            out[pos] = match m {
                b'Y' => *a,
                b'X' => b'X',
                digit => *digit,
            };
        }
        Some(out)
    }

    #[inline(always)]
    fn constraints_hold(&self, account: &AccountNumber, range: std::ops::Range<usize>) -> bool {
        self.0[range.clone()]
            .iter()
            .zip(&account.as_bytes()[range])
            .all(|(m, a)| !m.is_ascii_digit() || m == a)
    }
}

impl fmt::Display for AccountMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
