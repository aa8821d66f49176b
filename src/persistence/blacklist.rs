//! Usernames whose alerts skip the chat workflow entirely.
//!
//! Loaded once at startup into memory; `add` and `remove` write through
//! to the `blacklist` table. Nothing evicts entries implicitly.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::Result;

use super::db::Database;
use super::to_db_time;

/// In-memory blacklist with `SQLite` write-through.
pub struct Blacklist {
    db: Arc<Database>,
    names: HashSet<String>,
}

impl Blacklist {
    /// Load every blacklisted username from the database.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load(db: Arc<Database>) -> Result<Self> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT username FROM blacklist")
            .fetch_all(db.as_ref())
            .await?;
        let names: HashSet<String> = rows.into_iter().map(|(name,)| name).collect();
        info!(count = names.len(), "blacklist loaded");
        Ok(Self { db, names })
    }

    /// Whether `name` is blacklisted.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Add `name`. Returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails; memory is left unchanged.
    pub async fn add(&mut self, name: &str) -> Result<bool> {
        if self.names.contains(name) {
            return Ok(false);
        }
        sqlx::query("INSERT OR IGNORE INTO blacklist (username, added_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(to_db_time(Utc::now()))
            .execute(self.db.as_ref())
            .await?;
        self.names.insert(name.to_owned());
        Ok(true)
    }

    /// Remove `name`. Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails; memory is left unchanged.
    pub async fn remove(&mut self, name: &str) -> Result<bool> {
        if !self.names.contains(name) {
            return Ok(false);
        }
        sqlx::query("DELETE FROM blacklist WHERE username = ?1")
            .bind(name)
            .execute(self.db.as_ref())
            .await?;
        self.names.remove(name);
        Ok(true)
    }

    /// Blacklisted usernames in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
