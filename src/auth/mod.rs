//! Second-factor (push) authentication abstraction.
//!
//! Providers are stateless from the engine's point of view: they report
//! the status of the latest challenge and the session stores it, together
//! with the time of the last successful push.

pub mod duo;
pub mod null;
pub mod okta;

use serde::{Deserialize, Serialize};

use crate::models::user::ChatUser;
use crate::BoxFuture;

pub use duo::DuoAuth;
pub use null::NullAuth;
pub use okta::OktaAuth;

/// Status of a user's most recent MFA challenge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No challenge outstanding.
    #[default]
    None,
    /// Push sent, waiting for the user.
    Pending,
    /// User approved the push.
    Authorized,
    /// User rejected the push or it timed out.
    Denied,
}

impl AuthState {
    /// Whether the challenge has reached a final answer.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Authorized | Self::Denied)
    }
}

/// Push-based MFA operations.
pub trait MfaProvider: Send + Sync {
    /// Factor id usable for a push to `user`, or `None` if the user cannot
    /// be challenged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the provider cannot be queried.
    fn can_challenge<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, Option<String>>;

    /// Send a push to `user`. `reason` is shown on the device when the
    /// provider supports it. Must not wait for the user's answer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the push cannot be sent.
    fn begin_challenge<'a>(&'a self, user: &'a ChatUser, reason: &'a str) -> BoxFuture<'a, ()>;

    /// Current status of the latest challenge for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the provider cannot be queried.
    fn poll_status<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, AuthState>;

    /// Forget any outstanding challenge for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if provider state cannot be cleared.
    fn reset<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, ()>;
}
