//! Represents a remote log object (an S3 key) and its staged local copy.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Key of a single log object within the source bucket.
///
/// Keys are path-like (`logs/2018-01-10-00-01-02-ABCDEF`). Only the base name
/// (the segment after the last `/`) identifies an object for deduplication,
/// since the directory part of the listing does not always match how names
/// were recorded in `consumed_logs`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Full key as listed by the remote store.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segment after the last `/`, or the whole key when it has no directory.
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Local path the object is staged at inside `cache_dir`.
    pub fn staged_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(self.base_name())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// An object downloaded into the staging directory, waiting to be ingested.
#[derive(Clone, Debug)]
pub struct StagedObject {
    pub key: ObjectKey,

    /// Local file holding the downloaded bytes.
    pub path: PathBuf,

    /// Size of the staged file in bytes.
    pub size_bytes: u64,
}
