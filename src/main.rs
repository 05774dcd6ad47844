use anyhow::{Context, Result};
use chrono::Local;
use clap::CommandFactory;
use std::{process::ExitCode, time::Instant};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod pipeline;
mod services;

use config::{AppConfig, Args};
use errors::ConfigError;
use pipeline::{Pipeline, PipelineOptions};
use services::{
    log_store::LogStore,
    s3_source::{S3Config, S3Source},
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + initdb flag ---
    let (cfg, initdb) = match AppConfig::from_env_and_args() {
        Ok(parsed) => parsed,
        Err(err @ ConfigError::MissingRequired(_)) => {
            eprintln!("You must provide at least a bucket and database ({}).\n", err);
            Args::command().print_help()?;
            return Ok(ExitCode::from(2));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("{} -- caching logs from {}", Local::now(), cfg.bucket);
    tracing::debug!("Running with config: {:?}", cfg);
    let start = Instant::now();

    // --- Open (or recreate) the database ---
    let store = if initdb {
        LogStore::initialize(&cfg.database).await
    } else {
        LogStore::open(&cfg.database).await
    }
    .with_context(|| format!("opening database {}", cfg.database.display()))?;

    let source = S3Source::new(S3Config {
        bucket: cfg.bucket.clone(),
        region: cfg.region.clone(),
        endpoint: cfg.endpoint_url.clone(),
    })
    .await;

    let options = PipelineOptions {
        prefix: cfg.list_prefix(),
        page_cap: cfg.pages,
        cache_dir: cfg.cache_dir.clone(),
        workers: cfg.workers,
        batch_size: cfg.batch_size,
    };

    let summary = Pipeline::new(&source, &store, options)
        .run()
        .await
        .with_context(|| format!("caching logs from bucket {}", cfg.bucket))?;

    tracing::info!(
        "{} listed, {} previously cached, {} uncached",
        summary.listed,
        summary.consumed_before,
        summary.uncached
    );
    tracing::info!(
        "cached {} logs ({} records, {} skipped) in {} batches; {} logs and {} records in {}",
        summary.ingested,
        summary.records,
        summary.skipped,
        summary.batches,
        store.consumed_count().await?,
        store.usage_count().await?,
        store.path().display()
    );
    store.close().await;

    tracing::info!("{} minutes elapsed", start.elapsed().as_secs() / 60);
    Ok(ExitCode::SUCCESS)
}
