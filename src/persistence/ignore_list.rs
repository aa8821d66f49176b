//! Per-user ignore list of temporarily suppressed alert titles.
//!
//! Entries are written when an owner confirms an alert (auto backoff) and
//! when an alert is escalated because its owner is blacklisted or unknown.
//! Expired entries are pruned lazily on every read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::ignored::IgnoredAlert;
use crate::Result;

use super::db::Database;
use super::{from_db_time, to_db_time};

/// Repository wrapper around the `ignored` table.
#[derive(Clone)]
pub struct IgnoreList {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct IgnoredRow {
    username: String,
    title: String,
    reason: String,
    until: String,
}

impl IgnoredRow {
    fn into_entry(self) -> Result<IgnoredAlert> {
        Ok(IgnoredAlert {
            username: self.username,
            title: self.title,
            reason: self.reason,
            until: from_db_time(&self.until, "until")?,
        })
    }
}

impl IgnoreList {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Delete every entry that has lapsed at `now`. Returns rows removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ignored WHERE until <= ?1")
            .bind(to_db_time(now))
            .execute(self.db.as_ref())
            .await?;
        let pruned = result.rows_affected();
        if pruned > 0 {
            debug!(pruned, "pruned expired ignore entries");
        }
        Ok(pruned)
    }

    /// Live ignore entries for `username`, keyed by alert title.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if pruning or the query fails.
    pub async fn ignored_for(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, IgnoredAlert>> {
        self.prune(now).await?;
        let rows: Vec<IgnoredRow> = sqlx::query_as("SELECT * FROM ignored WHERE username = ?1")
            .bind(username)
            .fetch_all(self.db.as_ref())
            .await?;

        rows.into_iter()
            .map(|row| row.into_entry().map(|entry| (entry.title.clone(), entry)))
            .collect()
    }

    /// Suppress `title` for `username` until `until`, replacing any
    /// existing entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn ignore(
        &self,
        username: &str,
        title: &str,
        reason: &str,
        until: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ignored (username, title, reason, until) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(username, title) DO UPDATE SET reason = excluded.reason, until = excluded.until",
        )
        .bind(username)
        .bind(title)
        .bind(reason)
        .bind(to_db_time(until))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Remove one entry. Returns `false` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn remove(&self, username: &str, title: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ignored WHERE username = ?1 AND title = ?2")
            .bind(username)
            .bind(title)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every live entry, soonest expiry first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if pruning or the query fails.
    pub async fn list(&self, now: DateTime<Utc>) -> Result<Vec<IgnoredAlert>> {
        self.prune(now).await?;
        let rows: Vec<IgnoredRow> = sqlx::query_as("SELECT * FROM ignored ORDER BY until ASC")
            .fetch_all(self.db.as_ref())
            .await?;

        rows.into_iter().map(IgnoredRow::into_entry).collect()
    }
}
