//! Represents a log object that has already been ingested.

use chrono::Local;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::object::ObjectKey;

/// `ctime`-style timestamp used for `consumed_logs.date`.
pub const CONSUMED_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// One row of `consumed_logs`.
///
/// Presence of a `filename` here is the only signal that an object was
/// ingested; absence means it is new.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ConsumedLog {
    /// Insertion time, in `ctime` text form (`Wed Jan 10 12:00:00 2018`).
    pub date: String,

    /// Base name of the ingested object.
    pub filename: String,

    /// Size of the staged copy in bytes, stored as text.
    pub size: String,
}

impl ConsumedLog {
    /// Marker for `key`, stamped with the current local time.
    pub fn new(key: &ObjectKey, size_bytes: u64) -> Self {
        Self {
            date: Local::now().format(CONSUMED_DATE_FORMAT).to_string(),
            filename: key.base_name().to_string(),
            size: size_bytes.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn marker_records_base_name_and_size() {
        let marker = ConsumedLog::new(&ObjectKey::from("logs/2018-01-10/a"), 4096);
        assert_eq!(marker.filename, "a");
        assert_eq!(marker.size, "4096");
        assert!(NaiveDateTime::parse_from_str(&marker.date, CONSUMED_DATE_FORMAT).is_ok());
    }
}
