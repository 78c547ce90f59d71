use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed for {url}: {source}")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} while downloading {url}: {body}")]
    FetchFailed { url: String, status: u16, body: String },

    #[error("Download failed after {retries} retries for {url}")]
    MaxRetriesExceeded { url: String, retries: u32 },

    #[error("Extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    #[error("Malformed payload '{path}': {reason}")]
    MalformedPayload { path: PathBuf, reason: String },

    #[error("Invalid tax identifier '{value}'")]
    InvalidTaxId { value: String },

    #[error(transparent)]
    Snapshot(#[from] vatwl_verifier::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn extraction(reason: impl Into<String>) -> Self {
        Error::ExtractionFailed { reason: reason.into() }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MalformedPayload { path: path.into(), reason: reason.into() }
    }
}
