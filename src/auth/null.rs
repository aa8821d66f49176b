//! Provider for deployments without a second factor.

use crate::models::user::ChatUser;
use crate::BoxFuture;

use super::{AuthState, MfaProvider};

/// Nobody can be challenged; confirmations finish without a push.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuth;

impl MfaProvider for NullAuth {
    fn can_challenge<'a>(&'a self, _user: &'a ChatUser) -> BoxFuture<'a, Option<String>> {
        Box::pin(async { Ok(None) })
    }

    fn begin_challenge<'a>(&'a self, _user: &'a ChatUser, _reason: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn poll_status<'a>(&'a self, _user: &'a ChatUser) -> BoxFuture<'a, AuthState> {
        Box::pin(async { Ok(AuthState::None) })
    }

    fn reset<'a>(&'a self, _user: &'a ChatUser) -> BoxFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}
