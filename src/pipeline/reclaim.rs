//! Concurrent removal of staged files once their batch is committed.

use futures::{StreamExt, stream};
use std::{collections::HashSet, io::ErrorKind, path::Path};
use tokio::fs;
use tracing::info;

use crate::{
    errors::{IngestError, IngestResult},
    models::object::StagedObject,
    services::object_source::PARTIAL_DOWNLOAD_PREFIX,
};

/// Delete every staged file with at most `workers` removals in flight.
///
/// Must only be called after the batch's commit. A file that is already
/// gone means the pipeline sequencing is broken, so it is an error rather
/// than ignored. Waits for all removals before reporting the first failure.
pub async fn reclaim_batch(staged: &[StagedObject], workers: usize) -> IngestResult<usize> {
    let results: Vec<IngestResult<()>> = stream::iter(staged)
        .map(|object| async move {
            fs::remove_file(&object.path).await.map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    IngestError::StagedFileMissing(object.path.clone())
                } else {
                    IngestError::Io(err)
                }
            })
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let removed = results.iter().filter(|r| r.is_ok()).count();
    match results.into_iter().find_map(Result::err) {
        Some(err) => Err(err),
        None => Ok(removed),
    }
}

/// Remove what an interrupted run left in `cache_dir`: partial downloads,
/// and staged files whose object is already consumed (their batch committed
/// but reclaim never ran). Anything else is left for the run to overwrite.
pub async fn sweep_stale(cache_dir: &Path, consumed: &HashSet<String>) -> IngestResult<usize> {
    let mut entries = fs::read_dir(cache_dir).await?;
    let mut removed = 0usize;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(PARTIAL_DOWNLOAD_PREFIX) || consumed.contains(&*name) {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    if removed > 0 {
        info!("removed {} stale files from {}", removed, cache_dir.display());
    }
    Ok(removed)
}
