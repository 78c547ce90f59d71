use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use tracing::{info, warn};
use vatwl_verifier::{Snapshot, SnapshotStore, date_stamp};

use crate::config::FetchConfig;
use crate::error::Error;
use crate::extract::{Extractor, extractor_for};
use crate::payload::{find_payload, read_payload};

/// Base delay for exponential backoff (doubles each retry)
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Name of the scratch directory inside a day's snapshot directory.
pub const WORK_DIR: &str = "work";

/// Produces the ready snapshot for a given day, downloading it if needed.
///
/// Every call first purges other days from the cache. A day that already has
/// a readiness marker is loaded from disk without touching the network.
///
/// Two processes building the same day at once are not coordinated. Both
/// download and both commit; since the inputs are identical the result is the
/// same, but a reader may briefly see the marker disappear while the second
/// commit rewrites the files.
pub struct SnapshotBuilder {
    config: FetchConfig,
    store: SnapshotStore,
    client: Client,
    extractor: Box<dyn Extractor>,
}

impl SnapshotBuilder {
    /// Creates a builder using the extractor chosen in `config`.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let extractor = extractor_for(&config)?;
        Self::with_extractor(config, extractor)
    }

    /// Creates a builder with an explicit extractor.
    pub fn with_extractor(
        config: FetchConfig,
        extractor: Box<dyn Extractor>,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::HttpRequest { url: config.url_template.clone(), source: e })?;
        let store = SnapshotStore::new(config.cache_dir.clone());
        Ok(Self { config, store, client, extractor })
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Returns the snapshot for `date`, building it if no ready one exists.
    ///
    /// A ready snapshot that fails to load as corrupt is rebuilt.
    pub fn ensure(&self, date: NaiveDate) -> Result<Snapshot, Error> {
        self.store.purge(date);

        if self.store.exists(date) {
            match self.store.load(date) {
                Ok(snapshot) => {
                    info!(%date, "snapshot already ready, skipping download");
                    return Ok(snapshot);
                }
                Err(e @ vatwl_verifier::Error::CorruptIndex { .. }) => {
                    warn!(%date, error = %e, "ready snapshot is corrupt, rebuilding");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.build(date)
    }

    /// Downloads and rebuilds the snapshot for `date` even if one is ready.
    pub fn rebuild(&self, date: NaiveDate) -> Result<Snapshot, Error> {
        self.store.purge(date);
        self.build(date)
    }

    fn build(&self, date: NaiveDate) -> Result<Snapshot, Error> {
        let work_dir = self.store.snapshot_dir(date).join(WORK_DIR);
        if work_dir.exists() {
            fs::remove_dir_all(&work_dir)?;
        }
        fs::create_dir_all(&work_dir)?;

        let result = self.build_in(date, &work_dir);

        // Nothing in the scratch directory is needed once the build has
        // committed or failed.
        if let Err(e) = fs::remove_dir_all(&work_dir) {
            warn!(path = %work_dir.display(), error = %e, "failed to remove work directory");
        }
        result
    }

    fn build_in(&self, date: NaiveDate, work_dir: &Path) -> Result<Snapshot, Error> {
        let url = self.config.archive_url(date);
        let archive = work_dir.join(format!("{}.7z", date_stamp(date)));
        info!(%url, "downloading whitelist flat file");
        let bytes = self.download(&url, &archive)?;
        info!(bytes, "download complete");

        let extract_dir = work_dir.join("extracted");
        fs::create_dir_all(&extract_dir)?;
        info!(archive = %archive.display(), "extracting archive");
        self.extractor.extract(&archive, &extract_dir)?;

        let payload_path = find_payload(&extract_dir, date)?;
        let payload = read_payload(&payload_path)?;
        if payload.skipped > 0 {
            warn!(skipped = payload.skipped, "ignored malformed entries in flat file");
        }

        let snapshot = Snapshot::new(date, payload.iterations, payload.hashes, payload.masks);
        self.store.commit(&snapshot)?;
        Ok(snapshot)
    }

    /// Downloads `url` into `dest`, returning the number of bytes written.
    ///
    /// Transport failures and 5xx responses are retried with exponential
    /// backoff. Any other non-success status fails at once with the response
    /// body attached.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, Error> {
        let retries = self.config.max_retries;
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY_MS * (1 << attempt.min(10));
                thread::sleep(Duration::from_millis(delay));
            }

            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().unwrap_or_default();
                        let err = Error::FetchFailed {
                            url: url.to_string(),
                            status: status.as_u16(),
                            body,
                        };
                        if status.is_server_error() {
                            warn!(attempt, error = %err, "download attempt failed");
                            last_error = Some(err);
                            continue;
                        }
                        return Err(err);
                    }

                    match self.write_body(response, dest) {
                        Ok(bytes) => return Ok(bytes),
                        Err(e) => {
                            warn!(attempt, error = %e, "download interrupted");
                            last_error = Some(Error::Io(e));
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "download attempt failed");
                    last_error = Some(Error::HttpRequest { url: url.to_string(), source: e });
                }
            }
        }

        Err(match last_error {
            Some(err @ Error::FetchFailed { .. }) => err,
            Some(err) if retries == 0 => err,
            _ => Error::MaxRetriesExceeded { url: url.to_string(), retries },
        })
    }

    fn write_body(&self, response: Response, dest: &Path) -> io::Result<u64> {
        let progress = self.progress_bar(response.content_length());
        let mut writer = BufWriter::new(File::create(dest)?);
        let written = io::copy(&mut progress.wrap_read(response), &mut writer)?;
        writer.flush()?;
        progress.finish_and_clear();
        Ok(written)
    }

    fn progress_bar(&self, len: Option<u64>) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        match len {
            Some(len) => {
                let pb = ProgressBar::new(len);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                             {bytes}/{total_bytes} ({bytes_per_sec})",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            }
            None => ProgressBar::new_spinner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vatwl_verifier::snapshot::META_FILE;
    use vatwl_verifier::{HashIndex, iterated_digest};

    /// Fails the test if it is ever asked to extract anything.
    struct NoExtraction;

    impl Extractor for NoExtraction {
        fn extract(&self, _: &Path, _: &Path) -> Result<(), Error> {
            panic!("extraction must not run");
        }
    }

    fn config(cache_dir: &Path) -> FetchConfig {
        FetchConfig {
            cache_dir: cache_dir.to_path_buf(),
            // Nothing listens on the discard port; any download attempt fails.
            url_template: "http://127.0.0.1:9/{date}.7z".into(),
            max_retries: 0,
            ..Default::default()
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_ready_snapshot_is_loaded_without_network() {
        let tmp = tempfile::tempdir().unwrap();
        let builder =
            SnapshotBuilder::with_extractor(config(tmp.path()), Box::new(NoExtraction)).unwrap();

        let hashes: HashIndex = [iterated_digest("x", 4)].into_iter().collect();
        let snapshot = Snapshot::new(day(2), 4, hashes, Vec::new());
        builder.store().commit(&snapshot).unwrap();

        assert_eq!(builder.ensure(day(2)).unwrap(), snapshot);
    }

    #[test]
    fn test_ensure_purges_other_days() {
        let tmp = tempfile::tempdir().unwrap();
        let builder =
            SnapshotBuilder::with_extractor(config(tmp.path()), Box::new(NoExtraction)).unwrap();
        for d in [1, 2] {
            let snapshot = Snapshot::new(day(d), 1, HashIndex::default(), Vec::new());
            builder.store().commit(&snapshot).unwrap();
        }

        builder.ensure(day(2)).unwrap();
        assert!(!builder.store().exists(day(1)));
        assert!(builder.store().exists(day(2)));
    }

    #[test]
    fn test_corrupt_ready_snapshot_is_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let builder =
            SnapshotBuilder::with_extractor(config(tmp.path()), Box::new(NoExtraction)).unwrap();
        let snapshot = Snapshot::new(day(4), 2, HashIndex::default(), Vec::new());
        builder.store().commit(&snapshot).unwrap();
        fs::write(builder.store().snapshot_dir(day(4)).join(META_FILE), "garbage").unwrap();

        // The rebuild goes to the network, which is unreachable here.
        let err = builder.ensure(day(4)).unwrap_err();
        assert!(matches!(err, Error::HttpRequest { .. }), "{err}");
    }

    #[test]
    fn test_unreachable_server_fails_without_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let builder =
            SnapshotBuilder::with_extractor(config(tmp.path()), Box::new(NoExtraction)).unwrap();

        let err = builder.ensure(day(3)).unwrap_err();
        assert!(matches!(err, Error::HttpRequest { .. }), "{err}");
        assert!(!builder.store().exists(day(3)));
        assert!(!builder.store().snapshot_dir(day(3)).join(WORK_DIR).exists());
    }
}
