//! Error types shared by the ingestion pipeline.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures raised while listing, fetching, parsing, writing or reclaiming
/// log objects.
///
/// Only [`IngestError::ObjectNotFound`] is recoverable: the fetch pool skips
/// the object and carries on. Every other variant aborts the run; rerunning
/// is safe because nothing from an uncommitted batch is recorded as consumed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("listing bucket `{bucket}` with prefix `{prefix}` failed: {message}")]
    Listing {
        bucket: String,
        prefix: String,
        message: String,
    },
    #[error("downloading `{key}` from bucket `{bucket}` failed: {message}")]
    Transport {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("{}: line {line}: expected at least {expected} fields, found {found}", .path.display())]
    Format {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("reading staged file {}: {source}", .path.display())]
    StagedRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("decoding {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("staged file {} missing at reclaim", .0.display())]
    StagedFileMissing(PathBuf),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IngestError {
    /// True for the one condition the fetch pool tolerates.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IngestError::ObjectNotFound { .. })
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Problems with the command line or environment, reported before any work
/// starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option `--{0}`")]
    MissingRequired(&'static str),
    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: String, reason: String },
}
