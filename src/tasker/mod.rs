//! Task source abstraction.
//!
//! The [`TaskStore`] trait decouples the verification engine from the
//! storage that alert producers write into. The engine only reads tasks by
//! status and persists status and response changes; it never depends on
//! how the records are laid out. [`crate::persistence::task_repo::SqlTaskStore`]
//! is the `SQLite` implementation.

use crate::models::task::{NewAlert, Task, TaskStatus};
use crate::BoxFuture;

/// Read and write access to alert task records.
pub trait TaskStore: Send + Sync {
    /// All tasks currently at `status`, oldest event first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    fn tasks_with_status(&self, status: TaskStatus) -> BoxFuture<'_, Vec<Task>>;

    /// Persist a new status for the task identified by `hash`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    fn set_status<'a>(&'a self, hash: &'a str, status: TaskStatus) -> BoxFuture<'a, ()>;

    /// Persist the owner's response fields (`performed`, `comment`,
    /// `authenticated`) of `task`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    fn set_response<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, ()>;

    /// Delete the record for `hash`. Returns `false` if no record existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    fn delete<'a>(&'a self, hash: &'a str) -> BoxFuture<'a, bool>;

    /// Insert a new open alert and return the stored task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    fn create(&self, alert: NewAlert) -> BoxFuture<'_, Task>;
}
