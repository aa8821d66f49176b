//! Audit trail of verification outcomes.
//!
//! Every decision the bot makes about an alert (who it was routed to,
//! what they answered, whether it was escalated) is recorded as one
//! [`AuditEntry`]. [`JsonlAuditWriter`] appends them to daily files.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::task::Task;

/// What happened to an alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Alert routed to its owner's session.
    TaskAssigned,
    /// Owner confirmed performing the action.
    Confirmed,
    /// Owner denied performing the action.
    Denied,
    /// Owner refused the 2FA push.
    MfaDeclined,
    /// Owner approved the 2FA push.
    MfaSucceeded,
    /// 2FA push was rejected or timed out.
    MfaFailed,
    /// No answer before the escalation deadline.
    AutoEscalated,
    /// Alert matched an active ignore entry.
    Suppressed,
    /// Alert owner is blacklisted.
    BlacklistedUser,
    /// Alert owner is not in the chat directory.
    InvalidUser,
    /// Alert reached its final status.
    Finalized,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Alert hash.
    pub hash: Option<String>,
    /// Alert owner.
    pub username: Option<String>,
    /// Alert title.
    pub title: Option<String>,
    /// Free-form detail (user comment, ignore reason).
    pub detail: Option<String>,
}

impl AuditEntry {
    /// Entry stamped with the current time.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            hash: None,
            username: None,
            title: None,
            detail: None,
        }
    }

    /// Entry describing `task`.
    #[must_use]
    pub fn for_task(event_type: AuditEventType, task: &Task) -> Self {
        Self {
            hash: Some(task.hash.clone()),
            username: Some(task.username.clone()),
            title: Some(task.title.clone()),
            ..Self::new(event_type)
        }
    }

    /// Override the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a detail string. Empty strings are dropped.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.is_empty() {
            self.detail = Some(detail);
        }
        self
    }
}

/// Sink for audit entries.
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the entry cannot be persisted.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
