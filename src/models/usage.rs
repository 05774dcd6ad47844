//! Represents a single request line from an S3 server access log.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the `usage` table.
///
/// All fields are carried as opaque text exactly as they appear in the log
/// line; numeric-looking values (`http_status`, `size`, `total_time`) are not
/// validated.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq, Default)]
pub struct UsageRecord {
    /// Request time without the leading `[` (`06/Feb/2019:00:00:38`).
    pub date: String,
    pub remote_ip: String,
    pub requester: String,
    /// e.g. `REST.GET.OBJECT`
    pub operation: String,
    /// Key the request targeted (column `filename`).
    #[sqlx(rename = "filename")]
    #[serde(rename = "filename")]
    pub target_name: String,
    pub http_status: String,
    pub error_code: String,
    /// Object size in bytes.
    pub size: String,
    /// Total request time in milliseconds.
    pub total_time: String,
    pub referrer: String,
    pub user_agent: String,
}
