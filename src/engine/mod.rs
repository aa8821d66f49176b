//! Verification engine: per-user sessions and the dispatcher that drives them.

pub mod commands;
pub mod dispatcher;
pub mod session;
pub mod transition;

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use crate::audit::{AuditEntry, AuditLogger};
use crate::auth::MfaProvider;
use crate::chat::ChatClient;
use crate::config::GlobalConfig;
use crate::messages::Messages;
use crate::persistence::ignore_list::IgnoreList;
use crate::tasker::TaskStore;
use crate::time_budget::BusinessCalendar;
use crate::Result;

pub use dispatcher::Dispatcher;
pub use session::{AuthRecord, Session, StepOutcome};
pub use transition::{transition, Effect, SessionState, Snapshot, Transition};

/// Collaborators and policy shared by every session.
pub struct EngineContext {
    /// Chat transport.
    pub chat: Arc<dyn ChatClient>,
    /// Second-factor provider.
    pub mfa: Arc<dyn MfaProvider>,
    /// Alert task storage.
    pub tasks: Arc<dyn TaskStore>,
    /// Per-user alert suppression.
    pub ignore_list: IgnoreList,
    /// Optional audit sink.
    pub audit: Option<Arc<dyn AuditLogger>>,
    /// Message templates.
    pub messages: Messages,
    /// Business hours used to stretch deadlines.
    pub calendar: BusinessCalendar,
    /// Time allowed for an answer.
    pub escalation_window: Duration,
    /// Suppression after a confirmed alert.
    pub backoff_window: Duration,
    /// Validity of a successful push.
    pub reauth_window: Duration,
    /// Security team channel, if reports are enabled.
    pub reporting_channel: Option<String>,
}

impl EngineContext {
    /// Build a context from configuration and the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the calendar or message overrides are
    /// invalid.
    pub fn from_config(
        config: &GlobalConfig,
        chat: Arc<dyn ChatClient>,
        mfa: Arc<dyn MfaProvider>,
        tasks: Arc<dyn TaskStore>,
        ignore_list: IgnoreList,
        audit: Option<Arc<dyn AuditLogger>>,
    ) -> Result<Self> {
        Ok(Self {
            chat,
            mfa,
            tasks,
            ignore_list,
            audit,
            messages: Messages::with_overrides(&config.messages)?,
            calendar: config.calendar()?,
            escalation_window: config.escalation_window(),
            backoff_window: config.backoff_window(),
            reauth_window: config.reauth_window(),
            reporting_channel: config.slack.reporting_channel.clone(),
        })
    }

    /// Record an audit entry. Failures are logged, never propagated.
    pub fn audit(&self, entry: AuditEntry) {
        if let Some(ref audit) = self.audit {
            if let Err(err) = audit.log_entry(entry) {
                warn!(%err, "failed to write audit entry");
            }
        }
    }

    /// Post `text` to the reporting channel, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the post fails.
    pub async fn report(&self, text: &str) -> Result<()> {
        match self.reporting_channel {
            Some(ref channel) => self.chat.send_channel(channel, text).await,
            None => Ok(()),
        }
    }
}
