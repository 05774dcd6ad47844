//! Parses S3 server access log lines into [`UsageRecord`]s.
//!
//! Lines are space-delimited with `"`-quoted fields. The bracketed request
//! time splits into two fields (`[06/Feb/2019:00:00:38` and `+0000]`), so
//! positions below count it twice.

use csv::{ByteRecord, ReaderBuilder};
use std::path::Path;

use crate::{
    errors::{IngestError, IngestResult},
    models::usage::UsageRecord,
};

const DATE: usize = 2;
const REMOTE_IP: usize = 4;
const REQUESTER: usize = 5;
const OPERATION: usize = 7;
const KEY: usize = 8;
const HTTP_STATUS: usize = 10;
const ERROR_CODE: usize = 11;
const OBJECT_SIZE: usize = 13;
const TOTAL_TIME: usize = 14;
const REFERRER: usize = 16;
const USER_AGENT: usize = 17;

/// Fewest fields a line may have.
pub const MIN_FIELDS: usize = USER_AGENT + 1;

/// Parse a whole staged log file.
pub async fn parse_file(path: &Path) -> IngestResult<Vec<UsageRecord>> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| IngestError::StagedRead {
            path: path.to_path_buf(),
            source,
        })?;
    parse_bytes(&content, path)
}

/// Parse log content. `path` is only used in error messages.
///
/// Field contents are not validated; bytes that are not valid UTF-8 are
/// replaced with U+FFFD. A line with fewer than [`MIN_FIELDS`] fields fails
/// the whole parse.
pub fn parse_bytes(content: &[u8], path: &Path) -> IngestResult<Vec<UsageRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b' ')
        .quote(b'"')
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row.map_err(|source| IngestError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(to_usage(&row).ok_or_else(|| IngestError::Format {
            path: path.to_path_buf(),
            line: row.position().map(|p| p.line()).unwrap_or(0),
            expected: MIN_FIELDS,
            found: row.len(),
        })?);
    }
    Ok(records)
}

fn to_usage(row: &ByteRecord) -> Option<UsageRecord> {
    if row.len() < MIN_FIELDS {
        return None;
    }
    let field =
        |idx: usize| String::from_utf8_lossy(row.get(idx).unwrap_or_default()).into_owned();
    let date = field(DATE);

    Some(UsageRecord {
        date: date.strip_prefix('[').unwrap_or(&date).to_string(),
        remote_ip: field(REMOTE_IP),
        requester: field(REQUESTER),
        operation: field(OPERATION),
        target_name: field(KEY),
        http_status: field(HTTP_STATUS),
        error_code: field(ERROR_CODE),
        size: field(OBJECT_SIZE),
        total_time: field(TOTAL_TIME),
        referrer: field(REFERRER),
        user_agent: field(USER_AGENT),
    })
}
