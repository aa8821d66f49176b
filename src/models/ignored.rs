//! Ignore-list entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A temporarily suppressed alert title for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IgnoredAlert {
    /// Owner's chat username.
    pub username: String,
    /// Suppressed alert title.
    pub title: String,
    /// Why the alert is suppressed; copied into the task comment.
    pub reason: String,
    /// Suppression ends at this instant.
    pub until: DateTime<Utc>,
}

impl IgnoredAlert {
    /// Whether the entry has lapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.until <= now
    }
}
