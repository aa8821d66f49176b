//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so they are safe to
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS alert (
    hash            TEXT PRIMARY KEY NOT NULL,
    title           TEXT NOT NULL,
    username        TEXT NOT NULL,
    reason          TEXT NOT NULL,
    description     TEXT NOT NULL,
    url             TEXT NOT NULL,
    event_time      TEXT NOT NULL,
    performed       INTEGER,
    comment         TEXT NOT NULL DEFAULT '',
    authenticated   INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL CHECK(status IN ('open','in_progress','verification','done'))
);

CREATE TABLE IF NOT EXISTS ignored (
    username        TEXT NOT NULL,
    title           TEXT NOT NULL,
    reason          TEXT NOT NULL,
    until           TEXT NOT NULL,
    PRIMARY KEY (username, title)
);

CREATE TABLE IF NOT EXISTS blacklist (
    username        TEXT PRIMARY KEY NOT NULL,
    added_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alert_status ON alert(status);
CREATE INDEX IF NOT EXISTS idx_ignored_until ON ignored(until);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
