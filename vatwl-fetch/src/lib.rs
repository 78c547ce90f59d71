//! Downloads the Ministry of Finance VAT whitelist flat file and turns it into
//! the daily snapshot read by [vatwl-verifier](vatwl_verifier).
//!
//! The ministry publishes one `.7z` archive per day at
//! `https://plikplaski.mf.gov.pl/pliki/<yyyymmdd>.7z`. It holds a single JSON
//! document with the iteration count, the SHA-512 digests of active and exempt
//! taxpayers, and the virtual account masks. Building a snapshot means:
//!
//! 1. purge other days from the cache,
//! 2. reuse today's snapshot if its readiness marker exists,
//! 3. otherwise download, extract, parse and commit it.
//!
//! Nothing is committed unless every step succeeds, so a failed run leaves no
//! ready snapshot behind for that day.
//!
//! # Usage
//!
//! ```sh
//! vatwl-fetch --cache-dir ./mf_flat_cache --nip 1234567890 --account 00123456780000000000000001
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod payload;

pub use builder::SnapshotBuilder;
pub use config::{DEFAULT_URL_TEMPLATE, ExtractorKind, FetchConfig};
pub use error::Error;
pub use extract::{Extractor, SubprocessExtractor, extractor_for};
pub use payload::{Payload, find_payload, parse_payload, read_payload};

#[cfg(feature = "native-7z")]
pub use extract::NativeExtractor;
