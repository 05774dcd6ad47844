//! src/services/log_store.rs
//!
//! LogStore — the SQLite database access logs are cached into. Holds the
//! `usage` rows parsed from each log object and the `consumed_logs` rows
//! recording which objects have already been ingested. One store is opened
//! per run and is only ever written from the pipeline's control loop.

use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{
    collections::HashSet,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    errors::IngestResult,
    models::{consumed::ConsumedLog, object::ObjectKey, usage::UsageRecord},
};

/// Schema for both tables, split on `;` and run statement by statement.
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

const INSERT_CONSUMED_SQL: &str =
    "INSERT INTO consumed_logs (date, filename, size) VALUES (?, ?, ?)";
const INSERT_USAGE_SQL: &str = "INSERT INTO usage (
        date, remote_ip, requester, operation, filename, http_status,
        error_code, size, total_time, referrer, user_agent
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

#[derive(Clone)]
pub struct LogStore {
    db: SqlitePool,
    path: PathBuf,
}

impl LogStore {
    /// Open the database at `path`, creating the file and tables if absent.
    /// Existing rows are left untouched.
    pub async fn open(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                info!("Created missing directory {}", parent.display());
            }
        }

        // Rollback journal keeps every committed row in the main file, so the
        // `.bak` rename on --initdb carries the complete database.
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(Duration::from_secs(20));

        // A single connection: the control loop is the only writer.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { db, path };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Recreate the database from scratch.
    ///
    /// An existing file is renamed to `<path>.bak` first (replacing any older
    /// backup), then a fresh database with empty tables is created.
    pub async fn initialize(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let backup = backup_path(path);

        match fs::rename(path, &backup).await {
            Ok(()) => info!("Backed up {} to {}", path.display(), backup.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no existing database at {}", path.display());
            }
            Err(err) => return Err(err.into()),
        }

        Self::open(path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the pool, waiting for the connection to shut down.
    pub async fn close(&self) {
        self.db.close().await;
    }

    async fn run_migrations(&self) -> IngestResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&self.db).await?;
        }
        Ok(())
    }

    /// Base names of every object ingested so far.
    pub async fn consumed_names(&self) -> IngestResult<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT filename FROM consumed_logs")
            .fetch_all(&self.db)
            .await?;
        Ok(names.into_iter().collect())
    }

    #[cfg(test)]
    pub async fn consumed_logs(&self) -> IngestResult<Vec<ConsumedLog>> {
        let rows = sqlx::query_as::<_, ConsumedLog>(
            "SELECT date, filename, size FROM consumed_logs ORDER BY rowid",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn consumed_count(&self) -> IngestResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM consumed_logs")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn usage_count(&self) -> IngestResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM usage")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Usage rows in insertion order.
    #[cfg(test)]
    pub async fn usage_records(&self) -> IngestResult<Vec<UsageRecord>> {
        let rows = sqlx::query_as::<_, UsageRecord>(
            "SELECT date, remote_ip, requester, operation, filename, http_status,
                    error_code, size, total_time, referrer, user_agent
             FROM usage ORDER BY rowid",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Start writing one batch. Nothing written through the returned
    /// writer is durable until [`IngestWriter::commit`]; dropping it rolls
    /// the whole batch back.
    pub async fn begin_batch(&self) -> IngestResult<IngestWriter> {
        Ok(IngestWriter {
            tx: self.db.begin().await?,
            objects: 0,
            rows: 0,
        })
    }
}

/// Writes a batch of log objects inside a single transaction.
///
/// Each object gets its `consumed_logs` marker and its `usage` rows in the
/// same transaction, so a crash before commit leaves no trace of the batch
/// and the next run re-ingests all of it.
pub struct IngestWriter {
    tx: Transaction<'static, Sqlite>,
    objects: usize,
    rows: u64,
}

impl IngestWriter {
    pub async fn write_object(
        &mut self,
        key: &ObjectKey,
        size_bytes: u64,
        records: &[UsageRecord],
    ) -> IngestResult<()> {
        let marker = ConsumedLog::new(key, size_bytes);

        sqlx::query(INSERT_CONSUMED_SQL)
            .bind(&marker.date)
            .bind(&marker.filename)
            .bind(&marker.size)
            .execute(&mut *self.tx)
            .await?;

        for record in records {
            sqlx::query(INSERT_USAGE_SQL)
                .bind(&record.date)
                .bind(&record.remote_ip)
                .bind(&record.requester)
                .bind(&record.operation)
                .bind(&record.target_name)
                .bind(&record.http_status)
                .bind(&record.error_code)
                .bind(&record.size)
                .bind(&record.total_time)
                .bind(&record.referrer)
                .bind(&record.user_agent)
                .execute(&mut *self.tx)
                .await?;
        }

        self.objects += 1;
        self.rows += records.len() as u64;
        debug!("wrote {} usage rows for {}", records.len(), key.base_name());
        Ok(())
    }

    /// Commit the batch, returning `(objects, usage rows)` written.
    pub async fn commit(self) -> IngestResult<(usize, u64)> {
        self.tx.commit().await?;
        Ok((self.objects, self.rows))
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: &str, agent: &str) -> UsageRecord {
        UsageRecord {
            date: "06/Feb/2019:00:00:38".into(),
            remote_ip: "192.0.2.3".into(),
            requester: "-".into(),
            operation: "REST.GET.OBJECT".into(),
            target_name: target.into(),
            http_status: "200".into(),
            error_code: "-".into(),
            size: "434234".into(),
            total_time: "12".into(),
            referrer: "-".into(),
            user_agent: agent.into(),
        }
    }

    async fn ingest(store: &LogStore, objects: &[(&str, Vec<UsageRecord>)]) -> (usize, u64) {
        let mut writer = store.begin_batch().await.unwrap();
        for (key, records) in objects {
            writer
                .write_object(&ObjectKey::from(*key), 128, records)
                .await
                .unwrap();
        }
        writer.commit().await.unwrap()
    }

    #[tokio::test]
    async fn open_creates_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("logs.db")).await.unwrap();
        assert_eq!(store.consumed_count().await.unwrap(), 0);
        assert_eq!(store.usage_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ingest_batch_records_marker_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("logs.db")).await.unwrap();

        let written = ingest(
            &store,
            &[
                ("logs/2018-01-10/a", vec![record("x.png", "curl/7.1")]),
                ("logs/2018-01-10/b", vec![]),
            ],
        )
        .await;
        assert_eq!(written, (2, 1));

        let consumed = store.consumed_logs().await.unwrap();
        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].filename, "a");
        assert_eq!(consumed[0].size, "128");
        assert_eq!(consumed[1].filename, "b");
        assert_eq!(
            store.consumed_names().await.unwrap(),
            HashSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn quotes_and_delimiters_survive_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("logs.db")).await.unwrap();
        let tricky = record("it's a file.txt", "Mozilla/5.0 (X11; \"Linux\"), 'quoted'");

        ingest(&store, &[("logs/o'brien", vec![tricky.clone()])]).await;

        assert_eq!(store.usage_records().await.unwrap(), vec![tricky]);
        assert!(store.consumed_names().await.unwrap().contains("o'brien"));
    }

    #[tokio::test]
    async fn initialize_backs_up_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");

        let store = LogStore::open(&path).await.unwrap();
        ingest(&store, &[("logs/a", vec![record("k", "ua")])]).await;
        store.close().await;

        let fresh = LogStore::initialize(&path).await.unwrap();
        assert_eq!(fresh.consumed_count().await.unwrap(), 0);
        assert_eq!(fresh.usage_count().await.unwrap(), 0);

        let backup = LogStore::open(dir.path().join("logs.db.bak")).await.unwrap();
        assert_eq!(backup.consumed_count().await.unwrap(), 1);
        assert_eq!(backup.usage_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn initialize_without_existing_file_creates_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.db");

        let store = LogStore::initialize(&path).await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("logs.db.bak").exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn reopen_appends_without_dropping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");

        let first = LogStore::open(&path).await.unwrap();
        ingest(&first, &[("logs/a", vec![])]).await;
        first.close().await;

        let store = LogStore::open(&path).await.unwrap();
        ingest(&store, &[("logs/b", vec![])]).await;
        assert_eq!(store.consumed_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn dropped_writer_rolls_back_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("logs.db")).await.unwrap();

        {
            let mut writer = store.begin_batch().await.unwrap();
            writer
                .write_object(&ObjectKey::from("logs/a"), 10, &[record("k", "ua")])
                .await
                .unwrap();
            writer
                .write_object(&ObjectKey::from("logs/b"), 10, &[])
                .await
                .unwrap();
        }

        assert_eq!(store.consumed_count().await.unwrap(), 0);
        assert_eq!(store.usage_count().await.unwrap(), 0);
    }
}
