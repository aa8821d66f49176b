//! Chat directory entry for a person who can own alerts.

use serde::{Deserialize, Serialize};

/// A member of the chat workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUser {
    /// Chat-system identifier (e.g. Slack `U12345678`).
    pub id: String,
    /// Username; alerts are addressed by this value.
    pub name: String,
    /// Preferred first or display name, when the profile has one.
    pub display_name: Option<String>,
    /// Email from the chat profile, used to find the MFA identity.
    pub email: Option<String>,
}

impl ChatUser {
    /// Construct a user with only an id and a username.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: None,
            email: None,
        }
    }

    /// The best name to use when addressing the user.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.name)
    }

    /// Login used to look the user up with the MFA provider.
    #[must_use]
    pub fn mfa_login(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.name)
    }
}
