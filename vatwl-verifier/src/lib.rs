//! Offline checks against the Polish Ministry of Finance VAT whitelist flat file.
//!
//! The ministry publishes, once a day, a set of SHA-512 digests instead of
//! readable taxpayer records. Each digest is the result of hashing
//! `yyyymmdd + NIP + account` (or the account passed through one of the
//! published virtual account masks) a fixed number of times, each round over
//! the hex rendering of the previous one.
//!
//! This crate holds the network-free half of the check:
//!
//! - [`digest`]: the iterated SHA-512 transform,
//! - [`mask`]: account numbers and virtual account masks,
//! - [`snapshot`]: a day's digests in memory and the on-disk cache,
//! - [`matcher`]: composing preimages and testing them against a snapshot.
//!
//! Downloading and building a snapshot lives in `vatwl-fetch`.
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use vatwl_verifier::{AccountNumber, SnapshotStore, TaxId, WhitelistChecker};
//!
//! let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
//! let store = SnapshotStore::new(vatwl_verifier::cache_dir_from_env());
//! let snapshot = store.load(date)?;
//!
//! let nip = TaxId::parse("1234567890").unwrap();
//! let account = AccountNumber::parse("00123456780000000000000001");
//! let result = WhitelistChecker::new(&snapshot).check(date, &nip, account.as_ref());
//! println!("hit={} hash={}", result.hit, result.audit_hash);
//! # Ok::<(), vatwl_verifier::Error>(())
//! ```

use std::path::PathBuf;

pub mod digest;
pub mod error;
pub mod mask;
pub mod matcher;
pub mod snapshot;

pub use digest::{Digest512, iterated_digest, iterated_digest_hex};
pub use error::{EntryKind, Error};
pub use mask::{ACCOUNT_LEN, AccountMask, AccountNumber};
pub use matcher::{MatchResult, TaxId, WhitelistChecker, normalize_digits};
pub use snapshot::{HashIndex, PurgeReport, Snapshot, SnapshotStore, date_stamp};

/// Environment variable name for specifying the snapshot cache directory.
pub const CACHE_DIR_ENV: &str = "VATWL_CACHE_DIR";

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "mf_flat_cache";

/// Returns the cache directory from the VATWL_CACHE_DIR environment variable,
/// or falls back to [`DEFAULT_CACHE_DIR`].
pub fn cache_dir_from_env() -> PathBuf {
    std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from).unwrap_or_else(|| DEFAULT_CACHE_DIR.into())
}
