//! Abstraction over the remote store holding the access logs.
//!
//! Production runs use [`super::s3_source::S3Source`]; tests use the
//! in-memory [`super::memory_source::MemorySource`].

use async_trait::async_trait;
use std::path::Path;

use crate::errors::IngestResult;

/// Name prefix for in-progress downloads inside the staging directory.
pub const PARTIAL_DOWNLOAD_PREFIX: &str = ".tmp-";

/// One page of a prefix listing.
#[derive(Debug, Default, Clone)]
pub struct ListPage {
    /// Keys on this page, in the order the store returned them.
    pub keys: Vec<String>,

    /// Token for the next page, `None` once the listing is exhausted.
    pub next_token: Option<String>,
}

#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Bucket this source reads from.
    fn bucket(&self) -> &str;

    /// List one page of keys under `prefix`, continuing from `token`.
    ///
    /// Transport failures are returned as-is; there is no retry here since
    /// a listing can always be restarted from scratch.
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> IngestResult<ListPage>;

    /// Download `key` to `dest`, returning the number of bytes written.
    ///
    /// A key that no longer exists yields
    /// [`crate::errors::IngestError::ObjectNotFound`] and leaves nothing at
    /// `dest`. Any other failure is a transport error.
    async fn download(&self, key: &str, dest: &Path) -> IngestResult<u64>;
}
