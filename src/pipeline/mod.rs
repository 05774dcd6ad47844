//! The ingestion pipeline: list, diff against what is already cached, then
//! fetch, ingest and reclaim the remainder one batch at a time.
//!
//! Batches run strictly one after another. Within a batch, downloads and
//! deletes run on bounded concurrent pools; parsing and writing happen on the
//! control loop in batch order. Staged files are only removed after the
//! batch's transaction commits.

pub mod batch;
pub mod diff;
pub mod fetch;
pub mod lister;
pub mod parser;
pub mod reclaim;


use std::{collections::HashSet, path::PathBuf, time::Instant};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    errors::IngestResult,
    models::object::{ObjectKey, StagedObject},
    services::{
        log_store::{IngestWriter, LogStore},
        object_source::ObjectSource,
    },
};
use batch::{Batch, BatchScheduler};

/// Knobs for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub prefix: String,
    pub page_cap: Option<usize>,
    pub cache_dir: PathBuf,
    pub workers: usize,
    pub batch_size: usize,
}

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Keys returned by the listing.
    pub listed: usize,
    /// Objects already recorded as consumed before the run.
    pub consumed_before: usize,
    /// Keys selected for ingestion.
    pub uncached: usize,
    pub ingested: usize,
    /// Keys that disappeared before they could be downloaded.
    pub skipped: usize,
    /// Usage rows written.
    pub records: u64,
    pub batches: usize,
}

pub struct Pipeline<'a> {
    source: &'a dyn ObjectSource,
    store: &'a LogStore,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn ObjectSource, store: &'a LogStore, options: PipelineOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    /// Run until every uncached object is ingested or something fatal
    /// happens. Re-running after a failure is always safe.
    pub async fn run(&self) -> IngestResult<RunSummary> {
        fs::create_dir_all(&self.options.cache_dir).await?;

        let consumed = self.store.consumed_names().await?;
        info!("{} logs already cached", consumed.len());
        reclaim::sweep_stale(&self.options.cache_dir, &consumed).await?;

        let uncached = self.uncached_keys(consumed).await?;
        let mut scheduler = BatchScheduler::new(uncached.keys, self.options.batch_size);
        let mut summary = RunSummary {
            listed: uncached.listed,
            consumed_before: uncached.consumed,
            uncached: scheduler.total(),
            ..RunSummary::default()
        };
        info!("{} considered logs uncached", summary.uncached);

        while let Some(batch) = scheduler.next() {
            let (ingested, skipped, records) = self.run_batch(&batch).await?;
            summary.ingested += ingested;
            summary.skipped += skipped;
            summary.records += records;
            summary.batches += 1;
            debug!("{} logs left to cache", scheduler.remaining());
        }

        Ok(summary)
    }

    async fn uncached_keys(&self, consumed: HashSet<String>) -> IngestResult<Uncached> {
        info!(
            "Getting S3 list of logs from {}, filtering on \"{}\". This can take some time",
            self.source.bucket(),
            self.options.prefix
        );
        let remote = lister::list_keys(self.source, &self.options.prefix, self.options.page_cap).await?;
        info!("{} s3 logs considered", remote.len());

        let listed = remote.len();
        Ok(Uncached {
            listed,
            consumed: consumed.len(),
            keys: diff::uncached_keys(remote, &consumed),
        })
    }

    /// Fetch, ingest and reclaim one batch. Returns `(ingested, skipped, rows)`.
    async fn run_batch(&self, batch: &Batch) -> IngestResult<(usize, usize, u64)> {
        info!(
            "{:.1}% -- caching {} / {}",
            batch.percent_done(),
            batch.done_before,
            batch.total
        );

        let download_start = Instant::now();
        let fetched = fetch::fetch_batch(
            self.source,
            &batch.keys,
            &self.options.cache_dir,
            self.options.workers,
        )
        .await?;
        let download_elapsed = download_start.elapsed();

        let database_start = Instant::now();
        let mut writer = self.store.begin_batch().await?;
        for staged in &fetched.staged {
            ingest_object(&mut writer, staged).await?;
        }
        let (ingested, records) = writer.commit().await?;
        let database_elapsed = database_start.elapsed();

        let delete_start = Instant::now();
        let removed = reclaim::reclaim_batch(&fetched.staged, self.options.workers).await?;
        let delete_elapsed = delete_start.elapsed();

        debug!(
            batch = batch.index,
            "downloaded {} files in {:.1}s, cached {} rows in {:.1}s, deleted {} files in {:.1}s",
            fetched.staged.len(),
            download_elapsed.as_secs_f64(),
            records,
            database_elapsed.as_secs_f64(),
            removed,
            delete_elapsed.as_secs_f64()
        );

        Ok((ingested, fetched.skipped.len(), records))
    }
}

struct Uncached {
    listed: usize,
    consumed: usize,
    keys: Vec<ObjectKey>,
}

async fn ingest_object(writer: &mut IngestWriter, staged: &StagedObject) -> IngestResult<()> {
    let records = parser::parse_file(&staged.path).await?;
    writer
        .write_object(&staged.key, staged.size_bytes, &records)
        .await
}
