//! One day's whitelist, in memory and on disk.
//!
//! On-disk layout, one directory per calendar day under the store root:
//!
//! ```text
//! <root>/20250101/index.txt   one lowercase hex SHA-512 digest per line
//! <root>/20250101/index.meta  iteration count as a decimal integer
//! <root>/20250101/masks.txt   one 26 character mask per line (only if any)
//! <root>/20250101/.ready      readiness marker, written last
//! ```
//!
//! The marker is the only signal that a directory is complete. Readers in
//! other processes can rely on it; concurrent writers for the same day are
//! not coordinated.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::digest::{Digest512, parse_hex_digest, to_hex};
use crate::error::{EntryKind, Error};
use crate::mask::AccountMask;

pub const INDEX_FILE: &str = "index.txt";
pub const META_FILE: &str = "index.meta";
pub const MASKS_FILE: &str = "masks.txt";
pub const READY_MARKER: &str = ".ready";

/// Renders a date the way the publisher stamps file names and preimages.
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Sorted, deduplicated set of raw digests.
///
/// Membership is a binary search over fixed 64-byte records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashIndex {
    records: Vec<Digest512>,
}

impl HashIndex {
    pub fn from_unsorted(mut records: Vec<Digest512>) -> Self {
        records.sort_unstable();
        records.dedup();
        Self { records }
    }

    #[inline]
    pub fn contains(&self, digest: &Digest512) -> bool {
        self.records.binary_search(digest).is_ok()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Digest512> {
        self.records.iter()
    }
}

impl FromIterator<Digest512> for HashIndex {
    fn from_iter<I: IntoIterator<Item = Digest512>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

/// The whitelist as published for a single day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    date: NaiveDate,
    iterations: u32,
    hashes: HashIndex,
    masks: Vec<AccountMask>,
}

impl Snapshot {
    /// An iteration count of 0 is stored as 1.
    pub fn new(
        date: NaiveDate,
        iterations: u32,
        hashes: HashIndex,
        masks: Vec<AccountMask>,
    ) -> Self {
        Self { date, iterations: iterations.max(1), hashes, masks }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn hashes(&self) -> &HashIndex {
        &self.hashes
    }

    pub fn masks(&self) -> &[AccountMask] {
        &self.masks
    }
}

/// Outcome of [`SnapshotStore::purge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

/// Directory of daily snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the snapshot for `date`, whether or not it is ready.
    pub fn snapshot_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date_stamp(date))
    }

    /// True only once the readiness marker for `date` has been written.
    pub fn exists(&self, date: NaiveDate) -> bool {
        self.snapshot_dir(date).join(READY_MARKER).is_file()
    }

    /// Loads a ready snapshot.
    ///
    /// Fails with [`Error::NotReady`] when the marker is missing and with
    /// [`Error::CorruptIndex`] when the index or meta file cannot be read or
    /// the meta file does not hold a positive integer.
    pub fn load(&self, date: NaiveDate) -> Result<Snapshot, Error> {
        if !self.exists(date) {
            return Err(Error::NotReady { date });
        }
        let dir = self.snapshot_dir(date);

        let meta_path = dir.join(META_FILE);
        let meta =
            fs::read_to_string(&meta_path).map_err(|e| Error::corrupt(&meta_path, e.to_string()))?;
        let iterations = match meta.trim().parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(Error::corrupt(
                    &meta_path,
                    format!("iteration count '{}' is not a positive integer", meta.trim()),
                ));
            }
        };

        let index_path = dir.join(INDEX_FILE);
        let hashes = read_lines(&index_path)
            .map_err(|e| Error::corrupt(&index_path, e.to_string()))?
            .into_iter()
            .filter_map(|line| {
                let digest = parse_hex_digest(&line);
                if digest.is_none() {
                    let skipped = Error::SkippedEntry { kind: EntryKind::Hash, value: line };
                    debug!("{skipped}");
                }
                digest
            })
            .collect::<HashIndex>();

        let masks_path = dir.join(MASKS_FILE);
        let masks: Vec<AccountMask> = match read_lines(&masks_path) {
            Ok(lines) => lines
                .into_iter()
                .filter_map(|line| {
                    let mask = AccountMask::parse(&line);
                    if mask.is_none() {
                        let skipped = Error::SkippedEntry { kind: EntryKind::Mask, value: line };
                        debug!("{skipped}");
                    }
                    mask
                })
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::corrupt(&masks_path, e.to_string())),
        };

        info!(
            %date,
            hashes = hashes.len(),
            iterations,
            masks = masks.len(),
            "loaded whitelist snapshot"
        );
        Ok(Snapshot::new(date, iterations, hashes, masks))
    }

    /// Persists `snapshot` and then writes its readiness marker.
    ///
    /// Any earlier marker for the same day is removed first, so a reader never
    /// sees a half-rewritten directory as ready.
    pub fn commit(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let dir = self.snapshot_dir(snapshot.date());
        fs::create_dir_all(&dir)?;
        remove_if_present(&dir.join(READY_MARKER))?;

        let mut index = BufWriter::new(File::create(dir.join(INDEX_FILE))?);
        for digest in snapshot.hashes().iter() {
            writeln!(index, "{}", to_hex(digest))?;
        }
        index.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        write_synced(&dir.join(META_FILE), snapshot.iterations().to_string().as_bytes())?;

        let masks_path = dir.join(MASKS_FILE);
        if snapshot.masks().is_empty() {
            remove_if_present(&masks_path)?;
        } else {
            let mut contents = String::with_capacity(snapshot.masks().len() * 27);
            for mask in snapshot.masks() {
                contents.push_str(mask.as_str());
                contents.push('\n');
            }
            write_synced(&masks_path, contents.as_bytes())?;
        }

        write_synced(&dir.join(READY_MARKER), b"ok")?;

        info!(
            date = %snapshot.date(),
            hashes = snapshot.hashes().len(),
            iterations = snapshot.iterations(),
            masks = snapshot.masks().len(),
            "committed whitelist snapshot"
        );
        Ok(())
    }

    /// Removes everything under the root except the directory for `keep`.
    ///
    /// Best-effort: individual failures are logged and counted, never returned.
    pub fn purge(&self, keep: NaiveDate) -> PurgeReport {
        let mut report = PurgeReport::default();
        let keep_name = date_stamp(keep);

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "cannot list snapshot cache");
                report.failed += 1;
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot read snapshot cache entry");
                    report.failed += 1;
                    continue;
                }
            };
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && entry.file_name().to_str() == Some(keep_name.as_str()) {
                continue;
            }

            let result = if is_dir { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
            match result {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to purge stale snapshot");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(removed = report.removed, failed = report.failed, "purged snapshot cache");
        }
        report
    }
}

fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_owned());
        }
    }
    Ok(lines)
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::iterated_digest;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn sample(date: NaiveDate) -> Snapshot {
        let hashes = ["a", "b", "c", "a"].iter().map(|s| iterated_digest(s, 1)).collect();
        let masks = vec![
            AccountMask::parse("XX12345678YYYYYYYYYYYYYYYY").unwrap(),
            AccountMask::parse("YY87654321YYYYXXXXXXXXXXXX").unwrap(),
        ];
        Snapshot::new(date, 5000, hashes, masks)
    }

    #[test]
    fn test_date_stamp() {
        assert_eq!(date_stamp(day(9)), "20250109");
    }

    #[test]
    fn test_hash_index_sorts_and_dedups() {
        let a = iterated_digest("a", 1);
        let b = iterated_digest("b", 1);
        let index = HashIndex::from_unsorted(vec![b, a, b]);
        assert_eq!(index.len(), 2);
        assert!(index.contains(&a));
        assert!(index.contains(&b));
        assert!(!index.contains(&iterated_digest("c", 1)));
        assert!(!HashIndex::default().contains(&a));
    }

    #[test]
    fn test_zero_iterations_stored_as_one() {
        let snapshot = Snapshot::new(day(1), 0, HashIndex::default(), Vec::new());
        assert_eq!(snapshot.iterations(), 1);
    }

    #[test]
    fn test_commit_then_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let snapshot = sample(day(1));

        assert!(!store.exists(day(1)));
        store.commit(&snapshot).unwrap();
        assert!(store.exists(day(1)));

        let loaded = store.load(day(1)).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.hashes().len(), 3);
        assert_eq!(loaded.iterations(), 5000);
    }

    #[test]
    fn test_load_without_marker_is_not_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.commit(&sample(day(1))).unwrap();
        fs::remove_file(store.snapshot_dir(day(1)).join(READY_MARKER)).unwrap();

        assert!(!store.exists(day(1)));
        assert!(matches!(store.load(day(1)), Err(Error::NotReady { .. })));
    }

    #[test]
    fn test_load_rejects_bad_meta() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.commit(&sample(day(1))).unwrap();

        let meta = store.snapshot_dir(day(1)).join(META_FILE);
        for bad in ["0", "-3", "many", ""] {
            fs::write(&meta, bad).unwrap();
            assert!(matches!(store.load(day(1)), Err(Error::CorruptIndex { .. })), "meta {bad:?}");
        }
    }

    #[test]
    fn test_load_rejects_missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.commit(&sample(day(1))).unwrap();
        fs::remove_file(store.snapshot_dir(day(1)).join(INDEX_FILE)).unwrap();

        assert!(matches!(store.load(day(1)), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_load_skips_malformed_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.commit(&sample(day(1))).unwrap();

        let dir = store.snapshot_dir(day(1));
        let mut index = fs::read_to_string(dir.join(INDEX_FILE)).unwrap();
        index.push_str("not-a-digest\n\n");
        fs::write(dir.join(INDEX_FILE), index).unwrap();
        fs::write(dir.join(MASKS_FILE), "XX12345678YYYYYYYYYYYYYYYY\nshort\n").unwrap();

        let loaded = store.load(day(1)).unwrap();
        assert_eq!(loaded.hashes().len(), 3);
        assert_eq!(loaded.masks().len(), 1);
    }

    #[test]
    fn test_commit_without_masks_clears_old_mask_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.commit(&sample(day(1))).unwrap();

        let bare = Snapshot::new(day(1), 3, HashIndex::default(), Vec::new());
        store.commit(&bare).unwrap();

        assert!(!store.snapshot_dir(day(1)).join(MASKS_FILE).exists());
        assert_eq!(store.load(day(1)).unwrap(), bare);
    }

    #[test]
    fn test_purge_keeps_only_requested_day() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store.commit(&sample(day(1))).unwrap();
        store.commit(&sample(day(2))).unwrap();
        store.commit(&sample(day(3))).unwrap();
        fs::write(tmp.path().join("stray.7z"), b"junk").unwrap();

        let report = store.purge(day(3));
        assert_eq!(report, PurgeReport { removed: 3, failed: 0 });
        assert!(!store.exists(day(1)));
        assert!(!store.exists(day(2)));
        assert!(store.exists(day(3)));
        assert!(!tmp.path().join("stray.7z").exists());
    }

    #[test]
    fn test_purge_missing_root_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("absent"));
        assert_eq!(store.purge(day(1)), PurgeReport::default());
    }

    #[test]
    fn test_purge_counts_unlistable_root_as_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let store = SnapshotStore::new(&file);
        assert_eq!(store.purge(day(1)), PurgeReport { removed: 0, failed: 1 });
        assert!(file.is_file());
    }
}
