//! Persistence layer modules.

pub mod blacklist;
pub mod db;
pub mod ignore_list;
pub mod schema;
pub mod task_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AppError, Result};

/// Fixed-width RFC 3339 form so stored timestamps compare lexicographically.
pub(crate) fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, naming `field` in the error.
pub(crate) fn from_db_time(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}
