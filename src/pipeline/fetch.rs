//! Concurrent download of a batch into the staging directory.

use futures::{StreamExt, stream};
use std::path::Path;
use tracing::warn;

use crate::{
    errors::{IngestError, IngestResult},
    models::object::{ObjectKey, StagedObject},
    services::object_source::ObjectSource,
};

/// Result of fetching one batch.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Downloaded objects, in batch order.
    pub staged: Vec<StagedObject>,
    /// Objects that vanished between listing and download.
    pub skipped: Vec<ObjectKey>,
}

/// Download every key in `keys` to `cache_dir/<base name>` with at most
/// `workers` downloads in flight.
///
/// Returns only once every download in the batch has finished. Not-found
/// objects are logged and skipped; any other failure is returned after the
/// batch drains, first failure in batch order winning.
pub async fn fetch_batch(
    source: &dyn ObjectSource,
    keys: &[ObjectKey],
    cache_dir: &Path,
    workers: usize,
) -> IngestResult<FetchOutcome> {
    let mut results: Vec<(usize, IngestResult<StagedObject>)> =
        stream::iter(keys.iter().enumerate())
            .map(|(idx, key)| async move {
                let path = key.staged_path(cache_dir);
                let result = source
                    .download(key.as_str(), &path)
                    .await
                    .map(|size_bytes| StagedObject {
                        key: key.clone(),
                        path,
                        size_bytes,
                    });
                (idx, result)
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

    results.sort_unstable_by_key(|(idx, _)| *idx);

    let mut outcome = FetchOutcome::default();
    let mut failure: Option<IngestError> = None;
    for (idx, result) in results {
        match result {
            Ok(staged) => outcome.staged.push(staged),
            Err(err) if err.is_not_found() => {
                warn!(
                    "The object ({}) does not exist in bucket {}, skipping",
                    keys[idx],
                    source.bucket()
                );
                outcome.skipped.push(keys[idx].clone());
            }
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}
