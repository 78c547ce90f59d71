use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;

/// What kind of record an ignored line or array element was meant to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Hash,
    Mask,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Hash => f.write_str("hash"),
            EntryKind::Mask => f.write_str("mask"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Snapshot file '{path}' is corrupt: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("No ready snapshot for {date}")]
    NotReady { date: NaiveDate },

    /// A single malformed entry. Only ever logged; the surrounding load or
    /// build carries on without it.
    #[error("Skipped malformed {kind} entry '{value}'")]
    SkippedEntry { kind: EntryKind, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptIndex { path: path.into(), reason: reason.into() }
    }
}
