//! Configuration for building snapshots.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use vatwl_verifier::{DEFAULT_CACHE_DIR, date_stamp};

/// Where the ministry publishes the flat file. `{date}` is replaced with the
/// `yyyymmdd` stamp of the day being fetched.
pub const DEFAULT_URL_TEMPLATE: &str = "https://plikplaski.mf.gov.pl/pliki/{date}.7z";

/// Placeholder substituted in [`FetchConfig::url_template`].
pub const DATE_PLACEHOLDER: &str = "{date}";

/// Which decompressor unpacks the downloaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExtractorKind {
    /// In-process extraction, available with the `native-7z` feature.
    Native,
    /// Runs the 7z executable.
    #[default]
    Subprocess,
}

/// Configuration for [`crate::SnapshotBuilder`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Root of the snapshot cache.
    pub cache_dir: PathBuf,
    /// Archive URL with a `{date}` placeholder.
    pub url_template: String,
    /// Whole-request timeout for the archive download.
    pub timeout: Duration,
    /// Retries for transport errors and 5xx responses.
    pub max_retries: u32,
    pub extractor: ExtractorKind,
    /// 7z executable used by [`ExtractorKind::Subprocess`].
    pub seven_zip_path: PathBuf,
    /// Draw a progress bar while downloading.
    pub show_progress: bool,
}

impl FetchConfig {
    pub fn archive_url(&self, date: NaiveDate) -> String {
        self.url_template.replace(DATE_PLACEHOLDER, &date_stamp(date))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: DEFAULT_CACHE_DIR.into(),
            url_template: DEFAULT_URL_TEMPLATE.into(),
            timeout: Duration::from_secs(5 * 60),
            max_retries: 3,
            extractor: ExtractorKind::default(),
            seven_zip_path: "7z".into(),
            show_progress: false,
        }
    }
}
