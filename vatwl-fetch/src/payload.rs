//! The JSON document inside the published archive.
//!
//! Only the fields below are read; anything else in the document is ignored.
//!
//! ```text
//! {
//!   "naglowek": { "dataGenerowaniaDanych": "20250101", "liczbaTransformacji": "5000" },
//!   "skrotyPodatnikowCzynnych":    ["<sha512 hex>", ...],   active taxpayers
//!   "skrotyPodatnikowZwolnionych": ["<sha512 hex>", ...],   exempt taxpayers
//!   "maski": ["XX12345678YYYYXXXXXXXXXXXX", ...]
//! }
//! ```
//!
//! Masks have been published under more than one key over time, so all known
//! spellings are read.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use vatwl_verifier::digest::parse_hex_digest;
use vatwl_verifier::{AccountMask, EntryKind, HashIndex, date_stamp};

use crate::error::Error;

/// Array fields stay raw; a non-array value is ignored, not an error.
#[derive(Debug, Deserialize)]
struct FlatFile {
    #[serde(rename = "naglowek")]
    header: Option<Header>,
    #[serde(rename = "skrotyPodatnikowCzynnych")]
    active: Option<Value>,
    #[serde(rename = "skrotyPodatnikowZwolnionych")]
    exempt: Option<Value>,
    #[serde(rename = "maski")]
    masks: Option<Value>,
    #[serde(rename = "maskiRachunkowWirtualnych")]
    virtual_account_masks: Option<Value>,
    #[serde(rename = "maskiRachunkiWirtualne")]
    virtual_account_masks_alt: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(rename = "liczbaTransformacji")]
    transforms: Option<Value>,
    #[serde(rename = "dataGenerowaniaDanych")]
    generated: Option<Value>,
}

/// What one flat file contributes to a snapshot.
#[derive(Debug, Clone)]
pub struct Payload {
    pub iterations: u32,
    /// `dataGenerowaniaDanych` as published, for logging.
    pub generated: Option<String>,
    pub hashes: HashIndex,
    pub masks: Vec<AccountMask>,
    /// Hash and mask entries dropped for failing their format check.
    pub skipped: usize,
}

/// Reads and parses the flat file at `path`.
pub fn read_payload(path: &Path) -> Result<Payload, Error> {
    let file = File::open(path)?;
    parse_payload(BufReader::new(file), path)
}

/// Parses a flat file. `path` is only used in error messages.
///
/// Fails if the header, its iteration count or both hash arrays are missing.
/// An iteration count that is present but not a positive integer falls back
/// to 1.
pub fn parse_payload<R: Read>(reader: R, path: &Path) -> Result<Payload, Error> {
    let flat: FlatFile =
        serde_json::from_reader(reader).map_err(|e| Error::malformed(path, e.to_string()))?;

    let header = flat.header.ok_or_else(|| Error::malformed(path, "missing 'naglowek' header"))?;
    let transforms = header
        .transforms
        .ok_or_else(|| Error::malformed(path, "header has no 'liczbaTransformacji'"))?;
    let iterations = parse_iterations(&transforms).unwrap_or_else(|| {
        warn!(value = %transforms, "unusable iteration count, defaulting to 1");
        1
    });
    let generated = header.generated.map(|v| match v {
        Value::String(s) => s,
        other => other.to_string(),
    });

    let active = array_field("skrotyPodatnikowCzynnych", flat.active);
    let exempt = array_field("skrotyPodatnikowZwolnionych", flat.exempt);
    if active.is_none() && exempt.is_none() {
        return Err(Error::malformed(path, "no hash arrays in payload"));
    }

    let mut skipped = 0usize;
    let mut digests = Vec::new();
    for (name, entries) in [("active", active), ("exempt", exempt)] {
        let before = digests.len();
        for entry in entries.unwrap_or_default() {
            match entry {
                Value::String(s) => match parse_hex_digest(s.trim()) {
                    Some(digest) => digests.push(digest),
                    None => skip(&mut skipped, EntryKind::Hash, s),
                },
                _ => skip(&mut skipped, EntryKind::Hash, "<non-string>".into()),
            }
        }
        debug!(array = name, added = digests.len() - before, "read hash array");
    }
    let hashes = HashIndex::from_unsorted(digests);

    let mut masks = Vec::new();
    let mask_fields = [
        ("maski", flat.masks),
        ("maskiRachunkowWirtualnych", flat.virtual_account_masks),
        ("maskiRachunkiWirtualne", flat.virtual_account_masks_alt),
    ];
    for entries in mask_fields.into_iter().filter_map(|(name, v)| array_field(name, v)) {
        for entry in entries {
            match entry {
                Value::String(s) => match AccountMask::parse(&s) {
                    Some(mask) => masks.push(mask),
                    None => skip(&mut skipped, EntryKind::Mask, s),
                },
                _ => skip(&mut skipped, EntryKind::Mask, "<non-string>".into()),
            }
        }
    }

    info!(
        generated = generated.as_deref().unwrap_or("-"),
        hashes = hashes.len(),
        iterations,
        masks = masks.len(),
        skipped,
        "parsed flat file"
    );
    Ok(Payload { iterations, generated, hashes, masks, skipped })
}

/// Finds the flat file among the extracted files: `<yyyymmdd>.json` if
/// present, otherwise the first `.json` file by path.
pub fn find_payload(dir: &Path, date: NaiveDate) -> Result<PathBuf, Error> {
    let expected = format!("{}.json", date_stamp(date));
    let mut candidates = Vec::new();
    collect_json(dir, &mut candidates)?;
    candidates.sort();

    let exact = candidates
        .iter()
        .position(|p| p.file_name().and_then(|n| n.to_str()) == Some(expected.as_str()));
    match exact {
        Some(i) => Ok(candidates.swap_remove(i)),
        None => candidates.into_iter().next().ok_or_else(|| {
            Error::extraction(format!("archive contained no JSON payload in {}", dir.display()))
        }),
    }
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            out.push(path);
        }
    }
    Ok(())
}

fn parse_iterations(value: &Value) -> Option<u32> {
    let n = match value {
        Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse::<u32>().ok()?,
        _ => return None,
    };
    (n > 0).then_some(n)
}

/// Unwraps an array field. `null` counts as absent; any other non-array
/// value is logged and ignored.
fn array_field(name: &str, value: Option<Value>) -> Option<Vec<Value>> {
    match value? {
        Value::Array(items) => Some(items),
        Value::Null => None,
        _ => {
            warn!(field = name, "expected an array, ignoring field");
            None
        }
    }
}

fn skip(count: &mut usize, kind: EntryKind, value: String) {
    *count += 1;
    let skipped = vatwl_verifier::Error::SkippedEntry { kind, value };
    debug!("{skipped}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use vatwl_verifier::iterated_digest_hex;

    fn parse(json: &str) -> Result<Payload, Error> {
        parse_payload(json.as_bytes(), Path::new("20250101.json"))
    }

    #[test]
    fn test_parse_full_payload() {
        let a = iterated_digest_hex("a", 1);
        let b = iterated_digest_hex("b", 1);
        let json = format!(
            r#"{{
                "naglowek": {{ "dataGenerowaniaDanych": "20250101", "liczbaTransformacji": "5000", "schemat": "RR" }},
                "skrotyPodatnikowCzynnych": ["{a}", "{b}"],
                "skrotyPodatnikowZwolnionych": ["{}"],
                "maski": ["XX12345678YYYYXXXXXXXXXXXX"],
                "maskiRachunkowWirtualnych": ["YY87654321YYYYYYYYYYYYYYYY"],
                "somethingNew": {{ "ignored": true }}
            }}"#,
            a.to_uppercase()
        );
        let payload = parse(&json).unwrap();

        assert_eq!(payload.iterations, 5000);
        assert_eq!(payload.generated.as_deref(), Some("20250101"));
        assert_eq!(payload.hashes.len(), 2);
        assert_eq!(payload.masks.len(), 2);
        assert_eq!(payload.masks[0].as_str(), "XX12345678YYYYXXXXXXXXXXXX");
        assert_eq!(payload.skipped, 0);
    }

    #[test]
    fn test_numeric_iteration_count() {
        let json = r#"{"naglowek": {"liczbaTransformacji": 7}, "skrotyPodatnikowCzynnych": []}"#;
        assert_eq!(parse(json).unwrap().iterations, 7);
    }

    #[test]
    fn test_unusable_iteration_count_defaults_to_one() {
        for value in [r#""abc""#, "0", "-5", r#"{"n": 1}"#] {
            let json = format!(
                r#"{{"naglowek": {{"liczbaTransformacji": {value}}}, "skrotyPodatnikowZwolnionych": []}}"#
            );
            assert_eq!(parse(&json).unwrap().iterations, 1, "value {value}");
        }
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let json = r#"{"skrotyPodatnikowCzynnych": []}"#;
        assert!(matches!(parse(json), Err(Error::MalformedPayload { .. })));
    }

    #[test]
    fn test_missing_iteration_count_is_malformed() {
        let json = r#"{"naglowek": {"dataGenerowaniaDanych": "20250101"}, "skrotyPodatnikowCzynnych": []}"#;
        assert!(matches!(parse(json), Err(Error::MalformedPayload { .. })));
    }

    #[test]
    fn test_missing_hash_arrays_is_malformed() {
        let json = r#"{"naglowek": {"liczbaTransformacji": 5000}, "maski": []}"#;
        assert!(matches!(parse(json), Err(Error::MalformedPayload { .. })));
    }

    #[test]
    fn test_non_array_mask_field_is_ignored() {
        let json = r#"{
            "naglowek": {"liczbaTransformacji": 1},
            "skrotyPodatnikowCzynnych": [],
            "maski": {"note": "none today"},
            "maskiRachunkowWirtualnych": ["XX12345678YYYYXXXXXXXXXXXX"]
        }"#;
        let payload = parse(json).unwrap();
        assert_eq!(payload.masks.len(), 1);
        assert_eq!(payload.skipped, 0);
    }

    #[test]
    fn test_non_array_hash_field_counts_as_missing() {
        let json = r#"{"naglowek": {"liczbaTransformacji": 1}, "skrotyPodatnikowCzynnych": "n/a"}"#;
        assert!(matches!(parse(json), Err(Error::MalformedPayload { .. })));

        let json = r#"{
            "naglowek": {"liczbaTransformacji": 1},
            "skrotyPodatnikowCzynnych": "n/a",
            "skrotyPodatnikowZwolnionych": []
        }"#;
        assert!(parse(json).unwrap().hashes.is_empty());
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(parse("{\"naglowek\": "), Err(Error::MalformedPayload { .. })));
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let a = iterated_digest_hex("a", 1);
        let json = format!(
            r#"{{
                "naglowek": {{ "liczbaTransformacji": 2 }},
                "skrotyPodatnikowCzynnych": ["{a}", "deadbeef", 42, null],
                "maski": ["XX12345678YYYYXXXXXXXXXXXX", "XX1234", "xx12345678yyyyxxxxxxxxxxxx", 1]
            }}"#
        );
        let payload = parse(&json).unwrap();

        assert_eq!(payload.hashes.len(), 1);
        assert_eq!(payload.masks.len(), 1);
        assert_eq!(payload.skipped, 6);
    }

    #[test]
    fn test_find_payload_prefers_dated_name() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("aaa.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("nested").join("20250101.json"), "{}").unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let found = find_payload(tmp.path(), date).unwrap();
        assert_eq!(found, tmp.path().join("nested").join("20250101.json"));
    }

    #[test]
    fn test_find_payload_falls_back_to_any_json() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("export.JSON"), "{}").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "").unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(find_payload(tmp.path(), date).unwrap(), tmp.path().join("export.JSON"));
    }

    #[test]
    fn test_find_payload_without_json_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(find_payload(tmp.path(), date), Err(Error::ExtractionFailed { .. })));
    }
}
