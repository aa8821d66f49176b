//! Chat transport abstraction.
//!
//! The engine talks to people through [`ChatClient`] only. Delivery,
//! retries, and connection management belong to the implementation
//! ([`crate::slack::client::SlackChat`] in production).

use std::collections::HashMap;

use crate::models::user::ChatUser;
use crate::BoxFuture;

/// A direct message received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Chat identifier of the sender.
    pub user_id: String,
    /// Raw message text.
    pub text: String,
}

/// Messaging operations the verification engine depends on.
pub trait ChatClient: Send + Sync {
    /// Every member of the workspace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the directory cannot be listed.
    fn list_directory(&self) -> BoxFuture<'_, Vec<ChatUser>>;

    /// Drain direct messages received since the previous call. Must not
    /// block waiting for new messages.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the inbound stream has failed.
    fn receive_events(&self) -> BoxFuture<'_, Vec<ChatEvent>>;

    /// Send a direct message to `user`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the message cannot be queued.
    fn send_direct<'a>(&'a self, user: &'a ChatUser, text: &'a str) -> BoxFuture<'a, ()>;

    /// Post to a channel (the security team's reporting channel).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the message cannot be queued.
    fn send_channel<'a>(&'a self, channel: &'a str, text: &'a str) -> BoxFuture<'a, ()>;
}

/// Workspace members indexed by id and by username.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    by_id: HashMap<String, ChatUser>,
    by_name: HashMap<String, String>,
}

impl Directory {
    /// Index a list of users.
    #[must_use]
    pub fn new(users: Vec<ChatUser>) -> Self {
        let mut directory = Self::default();
        for user in users {
            directory.by_name.insert(user.name.clone(), user.id.clone());
            directory.by_id.insert(user.id.clone(), user);
        }
        directory
    }

    /// Look up a user by chat id.
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&ChatUser> {
        self.by_id.get(id)
    }

    /// Look up a user by username.
    ///
    /// Names containing whitespace never match.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&ChatUser> {
        if name.split_whitespace().count() != 1 {
            return None;
        }
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no users are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
