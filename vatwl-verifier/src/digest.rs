//! Iterated SHA-512 as used by the published whitelist.
//!
//! Round 1 hashes the UTF-8 bytes of the preimage. Every further round hashes
//! the lowercase hex rendering of the previous round's digest, not its raw
//! bytes.

use sha2::{Digest, Sha512};

/// Length of a raw SHA-512 digest in bytes.
pub const DIGEST_LEN: usize = 64;

/// Length of a hex-rendered SHA-512 digest.
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// A raw SHA-512 digest.
pub type Digest512 = [u8; DIGEST_LEN];

/// Lowercase hex lookup table.
const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Applies SHA-512 to `input` `iterations` times in total.
///
/// `iterations` of 0 and 1 both perform exactly one round.
pub fn iterated_digest(input: &str, iterations: u32) -> Digest512 {
    let mut hash = [0u8; DIGEST_LEN];
    hash.copy_from_slice(&Sha512::digest(input.as_bytes()));

    // Each round re-hexes into the same stack buffer, no allocation per round.
    let mut hex_buf = [0u8; DIGEST_HEX_LEN];
    for _ in 1..iterations {
        encode_lower_hex(&hash, &mut hex_buf);
        hash.copy_from_slice(&Sha512::digest(&hex_buf));
    }

    hash
}

/// Same as [`iterated_digest`], rendered as lowercase hex.
pub fn iterated_digest_hex(input: &str, iterations: u32) -> String {
    to_hex(&iterated_digest(input, iterations))
}

/// Renders a digest as lowercase hex.
pub fn to_hex(digest: &Digest512) -> String {
    hex::encode(digest)
}

/// Parses a 128 character hex string (either case) into a digest.
///
/// Returns `None` for any other length or a non-hex character.
pub fn parse_hex_digest(s: &str) -> Option<Digest512> {
    if s.len() != DIGEST_HEX_LEN {
        return None;
    }
    let mut out = [0u8; DIGEST_LEN];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}

#[inline(always)]
fn encode_lower_hex(digest: &Digest512, out: &mut [u8; DIGEST_HEX_LEN]) {
    for (i, byte) in digest.iter().enumerate() {
        out[i * 2] = HEX_CHARS[(byte >> 4) as usize];
        out[i * 2 + 1] = HEX_CHARS[(byte & 0x0f) as usize];
    }
}
