//! Alert task model and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::tasker::TaskStore;
use crate::{AppError, Result};

/// Disposition status of an alert task.
///
/// Ordered: a task only ever moves forward through these levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// New alert, owner not contacted yet.
    Open,
    /// Owner has been assigned the task.
    InProgress,
    /// Needs review by the security team.
    Verification,
    /// Resolved; the backing record is deleted.
    Done,
}

impl TaskStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Verification => "verification",
            Self::Done => "done",
        }
    }

    /// Parse the storage form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for an unknown status string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "verification" => Ok(Self::Verification),
            "done" => Ok(Self::Done),
            other => Err(AppError::Db(format!("invalid task status: {other}"))),
        }
    }

    /// Determine whether moving to `next` keeps the lifecycle monotonic.
    ///
    /// Re-asserting the current status is allowed (recovery re-marks
    /// in-progress tasks) except for `Done`, which is final.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress | Self::Verification)
                | (Self::InProgress, Self::InProgress | Self::Verification | Self::Done)
                | (Self::Verification, Self::Verification | Self::Done)
        )
    }
}

/// One alert awaiting disposition by the user who triggered it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Content hash; unique storage key.
    pub hash: String,
    /// Alert title, also the ignore-list key.
    pub title: String,
    /// Chat username of the owner.
    pub username: String,
    /// Why the alert fired.
    pub reason: String,
    /// Human-readable alert description.
    pub description: String,
    /// Link with more detail about the alert source.
    pub url: String,
    /// When the underlying event happened.
    pub event_time: DateTime<Utc>,
    /// Owner's answer to "did you do this?"; `None` until answered.
    pub performed: Option<bool>,
    /// Owner's comment or an escalation note.
    pub comment: String,
    /// Whether a second factor confirmed the owner's answer.
    pub authenticated: bool,
    /// Current lifecycle status.
    pub status: TaskStatus,
}

impl Task {
    /// Move the task to `InProgress` once it is assigned to a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the task is already past
    /// in-progress, or a store error.
    pub async fn set_in_progress(&mut self, store: &dyn TaskStore) -> Result<()> {
        self.check_transition(TaskStatus::InProgress)?;
        store.set_status(&self.hash, TaskStatus::InProgress).await?;
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    /// Move the task to `Verification` and persist the owner's response.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the task is `Done`, or a
    /// store error.
    pub async fn set_verifying(&mut self, store: &dyn TaskStore) -> Result<()> {
        self.check_transition(TaskStatus::Verification)?;
        store
            .set_status(&self.hash, TaskStatus::Verification)
            .await?;
        store.set_response(self).await?;
        self.status = TaskStatus::Verification;
        Ok(())
    }

    /// Mark the task `Done` and delete its backing record.
    ///
    /// Finalizing an already finalized task is a no-op. Returns whether a
    /// record was deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the task is still `Open`,
    /// or a store error.
    pub async fn finalize(&mut self, store: &dyn TaskStore) -> Result<bool> {
        if self.status == TaskStatus::Done {
            return Ok(false);
        }
        self.check_transition(TaskStatus::Done)?;
        store.set_status(&self.hash, TaskStatus::Done).await?;
        debug!(hash = %self.hash, "deleting finalized task");
        let deleted = store.delete(&self.hash).await?;
        self.status = TaskStatus::Done;
        Ok(deleted)
    }

    fn check_transition(&self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "task {} cannot move from {} to {}",
                self.hash,
                self.status.as_str(),
                next.as_str()
            )));
        }
        Ok(())
    }
}

/// Input for creating a new alert in the task store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    /// Alert title.
    pub title: String,
    /// Owner's chat username.
    pub username: String,
    /// Human-readable description.
    pub description: String,
    /// Why the alert fired.
    pub reason: String,
    /// Link with more detail.
    pub url: String,
    /// Event timestamp.
    pub event_time: DateTime<Utc>,
    /// Explicit storage key; derived from content when `None`.
    pub key: Option<String>,
}

impl NewAlert {
    /// Construct an alert stamped with the current time.
    #[must_use]
    pub fn new(
        title: String,
        username: String,
        description: String,
        reason: String,
        url: Option<String>,
    ) -> Self {
        Self {
            title,
            username,
            description,
            reason,
            url: url.unwrap_or_else(|| "N/A".into()),
            event_time: Utc::now(),
            key: None,
        }
    }

    /// Storage key for the alert.
    ///
    /// A SHA-256 over the alert content plus a random nonce, so two
    /// otherwise identical alerts still get distinct keys.
    #[must_use]
    pub fn hash(&self) -> String {
        if let Some(ref key) = self.key {
            return key.clone();
        }
        let mut hasher = Sha256::new();
        for part in [
            &self.title,
            &self.username,
            &self.description,
            &self.reason,
            &self.url,
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.event_time.to_rfc3339().as_bytes());
        hasher.update(Uuid::new_v4().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Materialize the open task this alert becomes.
    #[must_use]
    pub fn into_task(self) -> Task {
        let hash = self.hash();
        Task {
            hash,
            title: self.title,
            username: self.username,
            reason: self.reason,
            description: self.description,
            url: self.url,
            event_time: self.event_time,
            performed: None,
            comment: String::new(),
            authenticated: false,
            status: TaskStatus::Open,
        }
    }
}
