use crate::errors::ConfigError;
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Subdirectory of `--cache` that holds staged downloads.
pub const STAGING_SUBDIR: &str = "s3cache";
/// Key prefix S3 server access logs are delivered under.
pub const LOG_KEY_PREFIX: &str = "logs/";
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Centralized run configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bucket: String,
    pub database: PathBuf,
    pub date: Option<String>,
    pub cache_dir: PathBuf,
    pub pages: Option<usize>,
    pub workers: usize,
    pub batch_size: usize,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Caches S3 server access logs in a SQLite database for easier querying",
    long_about = "Caches S3 server access logs in a SQLite database for easier querying.\n\n\
        Run once with --initdb to create the database, then re-run (e.g. daily with \
        --date) to pick up new logs. Already cached logs are never ingested twice."
)]
pub struct Args {
    /// Initialize the database. Backs up an existing database file to `<database>.bak`
    #[arg(short = 'i', long)]
    pub initdb: bool,

    /// Name of the S3 bucket containing logs (overrides LOG_CACHE_BUCKET)
    #[arg(short = 'b', long)]
    pub bucket: Option<String>,

    /// Path to the SQLite database file (overrides LOG_CACHE_DATABASE)
    #[arg(short = 'd', long)]
    pub database: Option<PathBuf>,

    /// Filters which logs to cache: YYYY for a full year, YYYY-MM-DD for one day, etc.
    #[arg(short = 't', long)]
    pub date: Option<String>,

    /// Cache space for downloaded logs (overrides LOG_CACHE_CACHE_DIR, default /tmp)
    #[arg(short = 'c', long)]
    pub cache: Option<PathBuf>,

    /// Limits the number of 1000 item listing pages to process
    #[arg(short = 'p', long)]
    pub pages: Option<usize>,

    /// Number of download/delete workers (overrides LOG_CACHE_WORKERS, default 10)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Logs processed per batch (overrides LOG_CACHE_BATCH_SIZE, default 1000)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// AWS region of the bucket (overrides LOG_CACHE_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3 endpoint, e.g. for MinIO (overrides LOG_CACHE_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the initdb flag.
    pub fn from_env_and_args() -> Result<(Self, bool), ConfigError> {
        let args = Args::parse();
        let initdb = args.initdb;
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, initdb))
    }

    /// Merge parsed args with values looked up through `env`.
    ///
    /// CLI values win over environment values, which win over defaults.
    pub fn merge(
        args: Args,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bucket = args
            .bucket
            .or_else(|| env("LOG_CACHE_BUCKET"))
            .filter(|b| !b.is_empty())
            .ok_or(ConfigError::MissingRequired("bucket"))?;
        let database = args
            .database
            .or_else(|| env("LOG_CACHE_DATABASE").map(PathBuf::from))
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or(ConfigError::MissingRequired("database"))?;

        let cache_root = args
            .cache
            .or_else(|| env("LOG_CACHE_CACHE_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        let workers = positive_count(
            args.workers,
            "--workers",
            &env,
            "LOG_CACHE_WORKERS",
            DEFAULT_WORKERS,
        )?;
        let batch_size = positive_count(
            args.batch_size,
            "--batch-size",
            &env,
            "LOG_CACHE_BATCH_SIZE",
            DEFAULT_BATCH_SIZE,
        )?;

        Ok(Self {
            bucket,
            database,
            date: args.date.filter(|d| !d.is_empty()),
            cache_dir: cache_root.join(STAGING_SUBDIR),
            pages: args.pages,
            workers,
            batch_size,
            region: args.region.or_else(|| env("LOG_CACHE_REGION")),
            endpoint_url: args.endpoint_url.or_else(|| env("LOG_CACHE_ENDPOINT_URL")),
        })
    }

    /// Listing prefix derived from the date filter (`logs/2018-01-10`), or
    /// the empty prefix when no filter is set.
    pub fn list_prefix(&self) -> String {
        match &self.date {
            Some(date) => format!("{}{}", LOG_KEY_PREFIX, date),
            None => String::new(),
        }
    }
}

fn env_parse<T>(
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::Invalid {
                name: name.to_string(),
                reason: format!("parsing `{}`: {}", value, err),
            }),
        None => Ok(None),
    }
}

/// Resolve a count from the CLI flag, then the env var, then the default.
/// A zero is rejected, naming whichever source supplied it.
fn positive_count(
    cli: Option<usize>,
    flag: &str,
    env: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let (value, source) = match cli {
        Some(value) => (value, flag),
        None => match env_parse(env, var)? {
            Some(value) => (value, var),
            None => (default, "default"),
        },
    };
    if value == 0 {
        return Err(ConfigError::Invalid {
            name: source.to_string(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(value)
}
