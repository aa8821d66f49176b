//! Alert task repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::task::{NewAlert, Task, TaskStatus};
use crate::tasker::TaskStore;
use crate::{BoxFuture, Result};

use super::db::Database;
use super::{from_db_time, to_db_time};

/// [`TaskStore`] backed by the `alert` table.
#[derive(Clone)]
pub struct SqlTaskStore {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct AlertRow {
    hash: String,
    title: String,
    username: String,
    reason: String,
    description: String,
    url: String,
    event_time: String,
    performed: Option<i64>,
    comment: String,
    authenticated: i64,
    status: String,
}

impl AlertRow {
    fn into_task(self) -> Result<Task> {
        Ok(Task {
            hash: self.hash,
            title: self.title,
            username: self.username,
            reason: self.reason,
            description: self.description,
            url: self.url,
            event_time: from_db_time(&self.event_time, "event_time")?,
            performed: self.performed.map(|p| p != 0),
            comment: self.comment,
            authenticated: self.authenticated != 0,
            status: TaskStatus::parse(&self.status)?,
        })
    }
}

impl SqlTaskStore {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve a task by hash.
    ///
    /// Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, hash: &str) -> Result<Option<Task>> {
        let row: Option<AlertRow> = sqlx::query_as("SELECT * FROM alert WHERE hash = ?1")
            .bind(hash)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(AlertRow::into_task).transpose()
    }

    /// Count tasks per status, for operator reporting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_by_status(&self) -> Result<Vec<(TaskStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM alert GROUP BY status ORDER BY status")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((TaskStatus::parse(&status)?, count)))
            .collect()
    }

    async fn list(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let rows: Vec<AlertRow> =
            sqlx::query_as("SELECT * FROM alert WHERE status = ?1 ORDER BY event_time ASC")
                .bind(status.as_str())
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(AlertRow::into_task).collect()
    }

    async fn update_status(&self, hash: &str, status: TaskStatus) -> Result<()> {
        sqlx::query("UPDATE alert SET status = ?1 WHERE hash = ?2")
            .bind(status.as_str())
            .bind(hash)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn update_response(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "UPDATE alert SET comment = ?1, performed = ?2, authenticated = ?3 WHERE hash = ?4",
        )
        .bind(&task.comment)
        .bind(task.performed.map(i64::from))
        .bind(i64::from(task.authenticated))
        .bind(&task.hash)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    async fn remove(&self, hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alert WHERE hash = ?1")
            .bind(hash)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, alert: NewAlert) -> Result<Task> {
        let task = alert.into_task();

        sqlx::query(
            "INSERT INTO alert (hash, title, username, reason, description, url,
             event_time, performed, comment, authenticated, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, '', 0, ?8)",
        )
        .bind(&task.hash)
        .bind(&task.title)
        .bind(&task.username)
        .bind(&task.reason)
        .bind(&task.description)
        .bind(&task.url)
        .bind(to_db_time(task.event_time))
        .bind(task.status.as_str())
        .execute(self.db.as_ref())
        .await?;

        Ok(task)
    }
}

impl TaskStore for SqlTaskStore {
    fn tasks_with_status(&self, status: TaskStatus) -> BoxFuture<'_, Vec<Task>> {
        Box::pin(self.list(status))
    }

    fn set_status<'a>(&'a self, hash: &'a str, status: TaskStatus) -> BoxFuture<'a, ()> {
        Box::pin(self.update_status(hash, status))
    }

    fn set_response<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, ()> {
        Box::pin(self.update_response(task))
    }

    fn delete<'a>(&'a self, hash: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(self.remove(hash))
    }

    fn create(&self, alert: NewAlert) -> BoxFuture<'_, Task> {
        Box::pin(self.insert(alert))
    }
}
