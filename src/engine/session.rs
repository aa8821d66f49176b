//! Per-user verification session.
//!
//! A [`Session`] owns the tasks queued for one user and walks them through
//! the conversation one at a time. Each [`Session::step`] evaluates
//! [`transition`] once and applies the resulting effects to a draft copy of
//! the session; the draft replaces the session only when every effect
//! succeeded, so a failed step leaves the session exactly as it was.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditEventType};
use crate::auth::AuthState;
use crate::messages::{quote, MessageKey};
use crate::models::task::Task;
use crate::models::user::ChatUser;
use crate::time_budget::expires_at;
use crate::{AppError, Result};

use super::transition::{transition, Effect, Report, SessionState, Snapshot};
use super::EngineContext;

const AUTO_ESCALATED_COMMENT: &str = "Auto escalated. No response received.";
const NO_COMMENT: &str = "No comment provided.";
const DECLINED_MFA_COMMENT: &str = "User not comfortable performing MFA check.";
const BACKOFF_REASON: &str = "auto backoff after confirmation";

/// The user's latest reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// `Some(true)` for yes, `Some(false)` for no.
    pub answer: Option<bool>,
    /// Text following the yes/no.
    pub text: String,
}

/// Last observed second-factor result for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthRecord {
    /// Latest MFA state.
    pub state: AuthState,
    /// When the last push was approved.
    pub authed_at: Option<DateTime<Utc>>,
}

impl AuthRecord {
    /// Whether a push was approved less than `window` before `now`.
    #[must_use]
    pub fn recently_authenticated(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.state == AuthState::Authorized
            && self.authed_at.is_some_and(|at| now - at < window)
    }

    fn observe(&mut self, polled: AuthState, now: DateTime<Utc>) {
        match polled {
            // Provider lost track of the challenge; keep what we know.
            AuthState::None => {}
            AuthState::Authorized => {
                if self.state != AuthState::Authorized {
                    self.authed_at = Some(now);
                }
                self.state = AuthState::Authorized;
            }
            other => self.state = other,
        }
    }
}

/// Whether the dispatcher should keep the session after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Session still has work or is mid-conversation.
    Continue,
    /// Queue drained; remove the session.
    Deactivate,
}

/// One user's live verification state.
#[derive(Debug, Clone)]
pub struct Session {
    user: ChatUser,
    state: SessionState,
    queue: VecDeque<Task>,
    current: Option<Task>,
    response: Response,
    factor: Option<String>,
    auth: AuthRecord,
    deadline: Option<DateTime<Utc>>,
}

impl Session {
    /// Idle session for `user`. `factor` is the push factor returned by
    /// the MFA provider, `auth` the user's previous MFA record.
    #[must_use]
    pub fn new(user: ChatUser, factor: Option<String>, auth: AuthRecord) -> Self {
        Self {
            user,
            state: SessionState::NeedTask,
            queue: VecDeque::new(),
            current: None,
            response: Response::default(),
            factor,
            auth,
            deadline: None,
        }
    }

    /// The session's user.
    #[must_use]
    pub fn user(&self) -> &ChatUser {
        &self.user
    }

    /// Current conversation state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Task in focus.
    #[must_use]
    pub fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    /// Tasks waiting behind the current one.
    pub fn queued(&self) -> impl Iterator<Item = &Task> {
        self.queue.iter()
    }

    /// Escalation deadline; `None` means it never fires.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Latest MFA record.
    #[must_use]
    pub fn auth_record(&self) -> AuthRecord {
        self.auth
    }

    /// Pending reply, if any.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Whether the session holds `hash` in focus or in its queue.
    #[must_use]
    pub fn holds(&self, hash: &str) -> bool {
        self.current.as_ref().is_some_and(|task| task.hash == hash)
            || self.queue.iter().any(|task| task.hash == hash)
    }

    /// Whether the session has nothing to do: no task in focus, nothing
    /// queued, and not mid-conversation.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::NeedTask && self.current.is_none() && self.queue.is_empty()
    }

    /// Record a "yes" reply.
    pub fn positive_response(&mut self, text: impl Into<String>) {
        self.response = Response {
            answer: Some(true),
            text: text.into(),
        };
    }

    /// Record a "no" reply.
    pub fn negative_response(&mut self, text: impl Into<String>) {
        self.response = Response {
            answer: Some(false),
            text: text.into(),
        };
    }

    /// Refresh the push factor after a new capability lookup.
    pub fn set_factor(&mut self, factor: Option<String>) {
        self.factor = factor;
    }

    /// Queue `task` and drop anything the user currently has ignored.
    ///
    /// # Errors
    ///
    /// Returns a store error if the ignore list cannot be read or an
    /// ignored task cannot be moved to verification. `task` stays queued.
    pub async fn enqueue(
        &mut self,
        ctx: &EngineContext,
        task: Task,
        now: DateTime<Utc>,
    ) -> Result<()> {
        debug!(user = %self.user.name, hash = %task.hash, "queueing task");
        self.queue.push_back(task);
        self.filter_queue(ctx, now).await
    }

    /// Evaluate and apply at most one transition.
    ///
    /// # Errors
    ///
    /// Returns the first collaborator error hit while polling or applying
    /// effects. Apart from a freshly polled MFA state the session is left
    /// unchanged in that case.
    pub async fn step(&mut self, ctx: &EngineContext, now: DateTime<Utc>) -> Result<StepOutcome> {
        if self.state == SessionState::WaitingOnAuth {
            let polled = ctx.mfa.poll_status(&self.user).await?;
            self.auth.observe(polled, now);
        }

        let snapshot = self.snapshot(ctx, now);
        let Some(next) = transition(self.state, &snapshot) else {
            return Ok(StepOutcome::Continue);
        };

        let mut draft = self.clone();
        let mut outcome = StepOutcome::Continue;
        for effect in &next.effects {
            if draft.apply(ctx, *effect, now).await? == StepOutcome::Deactivate {
                outcome = StepOutcome::Deactivate;
            }
        }

        debug!(
            user = %self.user.name,
            from = self.state.as_str(),
            to = next.next.as_str(),
            "session transition"
        );
        draft.state = next.next;
        *self = draft;
        Ok(outcome)
    }

    /// Guard inputs at `now`.
    #[must_use]
    pub fn snapshot(&self, ctx: &EngineContext, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            task_available: self.current.is_some() || !self.queue.is_empty(),
            answer: self.response.answer,
            can_challenge: self.factor.is_some(),
            recently_authenticated: self.auth.recently_authenticated(now, ctx.reauth_window),
            auth_state: self.auth.state,
            deadline_passed: self.deadline.is_some_and(|deadline| now > deadline),
        }
    }

    async fn apply(
        &mut self,
        ctx: &EngineContext,
        effect: Effect,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome> {
        match effect {
            Effect::BeginTask => self.begin_task(ctx, now).await?,
            Effect::RecordResponse => self.record_response(ctx)?,
            Effect::ClearResponse => self.response = Response::default(),
            Effect::MarkAuthenticated => self.current_task_mut()?.authenticated = true,
            Effect::Notify(key) => self.notify(ctx, key).await?,
            Effect::Report(report) => self.report(ctx, report).await?,
            Effect::Verify => {
                let task = self.current_task_mut()?;
                task.set_verifying(ctx.tasks.as_ref()).await?;
            }
            Effect::AutoEscalate => self.auto_escalate(ctx).await?,
            Effect::BeginChallenge => {
                let reason = self.current_task()?.description.clone();
                ctx.mfa.begin_challenge(&self.user, &reason).await?;
                self.auth.state = AuthState::Pending;
            }
            Effect::RecordAuthResult => self.record_auth_result(ctx).await?,
            Effect::FinishTask => return self.finish_task(ctx, now).await,
        }
        Ok(StepOutcome::Continue)
    }

    async fn begin_task(&mut self, ctx: &EngineContext, now: DateTime<Utc>) -> Result<()> {
        if self.current.is_none() {
            self.current = self.queue.pop_front();
        }
        let task = self.current_task()?;

        let greeting = ctx
            .messages
            .render(MessageKey::Greeting, &[("name", self.user.greeting_name())]);
        let reason = quote(&task.reason);
        let mut alert = ctx.messages.render(
            MessageKey::Alert,
            &[("description", task.description.as_str()), ("reason", reason.as_str())],
        );
        alert.push('\n');
        alert.push_str(ctx.messages.get(MessageKey::ActionPrompt));

        ctx.chat.send_direct(&self.user, &greeting).await?;
        ctx.chat.send_direct(&self.user, &alert).await?;

        info!(user = %self.user.name, hash = %task.hash, title = %task.title, "beginning task");
        ctx.audit(AuditEntry::for_task(AuditEventType::TaskAssigned, task).at(now));

        self.response = Response::default();
        self.deadline = Some(expires_at(now, ctx.escalation_window, &ctx.calendar));
        Ok(())
    }

    fn record_response(&mut self, ctx: &EngineContext) -> Result<()> {
        let response = std::mem::take(&mut self.response);
        let Some(answer) = response.answer else {
            return Ok(());
        };
        let task = self.current_task_mut()?;
        task.performed = Some(answer);
        task.comment = response.text;
        if answer {
            ctx.audit(
                AuditEntry::for_task(AuditEventType::Confirmed, task).with_detail(&task.comment),
            );
        }
        Ok(())
    }

    async fn notify(&self, ctx: &EngineContext, key: MessageKey) -> Result<()> {
        let text = ctx
            .messages
            .render(key, &[("name", self.user.greeting_name())]);
        ctx.chat.send_direct(&self.user, &text).await
    }

    async fn report(&self, ctx: &EngineContext, report: Report) -> Result<()> {
        let task = self.current_task()?;
        let (key, comment, event) = match report {
            Report::NotPerformed => {
                let comment = if self.response.text.trim().is_empty() {
                    NO_COMMENT
                } else {
                    self.response.text.as_str()
                };
                (MessageKey::Report, quote(comment), AuditEventType::Denied)
            }
            Report::DeclinedMfa => (
                MessageKey::Report,
                quote(DECLINED_MFA_COMMENT),
                AuditEventType::MfaDeclined,
            ),
            Report::FailedMfa => (
                MessageKey::ReportBadAuth,
                String::new(),
                AuditEventType::MfaFailed,
            ),
        };

        warn!(user = %self.user.name, hash = %task.hash, title = %task.title, event = ?event, "escalating task");
        let text = ctx.messages.render(
            key,
            &[
                ("username", self.user.name.as_str()),
                ("title", task.title.as_str()),
                ("description", task.description.as_str()),
                ("comment", comment.as_str()),
                ("url", task.url.as_str()),
            ],
        );
        ctx.report(&text).await?;
        ctx.audit(AuditEntry::for_task(event, task).with_detail(comment));
        Ok(())
    }

    async fn auto_escalate(&mut self, ctx: &EngineContext) -> Result<()> {
        let task = self.current_task()?;
        info!(user = %self.user.name, hash = %task.hash, title = %task.title, "silently escalating");
        let text = ctx.messages.render(
            MessageKey::ReportNoResponse,
            &[
                ("username", self.user.name.as_str()),
                ("title", task.title.as_str()),
                ("description", task.description.as_str()),
                ("url", task.url.as_str()),
            ],
        );
        ctx.report(&text).await?;

        let task = self.current_task_mut()?;
        if !task.comment.is_empty() {
            task.comment.push(' ');
        }
        task.comment.push_str(AUTO_ESCALATED_COMMENT);
        task.set_verifying(ctx.tasks.as_ref()).await?;
        ctx.audit(AuditEntry::for_task(AuditEventType::AutoEscalated, task));

        self.deadline = None;
        self.notify(ctx, MessageKey::NoResponse).await
    }

    async fn record_auth_result(&mut self, ctx: &EngineContext) -> Result<()> {
        if self.auth.state == AuthState::Authorized {
            let task = self.current_task_mut()?;
            task.authenticated = true;
            ctx.audit(AuditEntry::for_task(AuditEventType::MfaSucceeded, task));
            self.notify(ctx, MessageKey::GoodAuth).await
        } else {
            self.current_task_mut()?.authenticated = false;
            self.notify(ctx, MessageKey::BadAuth).await?;
            ctx.mfa.reset(&self.user).await?;
            self.auth = AuthRecord::default();
            Ok(())
        }
    }

    async fn finish_task(&mut self, ctx: &EngineContext, now: DateTime<Utc>) -> Result<StepOutcome> {
        let mut task = self
            .current
            .take()
            .ok_or_else(|| AppError::NotFound(format!("{} has no task to finish", self.user.name)))?;

        if task.performed == Some(true) {
            let until = expires_at(now, ctx.backoff_window, &ctx.calendar);
            ctx.ignore_list
                .ignore(&task.username, &task.title, BACKOFF_REASON, until)
                .await?;
        }
        task.finalize(ctx.tasks.as_ref()).await?;
        ctx.audit(
            AuditEntry::for_task(AuditEventType::Finalized, &task).with_detail(&task.comment),
        );

        self.response = Response::default();
        self.deadline = None;
        self.filter_queue(ctx, now).await?;

        if self.queue.is_empty() {
            self.notify(ctx, MessageKey::Bye).await?;
            info!(user = %self.user.name, "no tasks left");
            Ok(StepOutcome::Deactivate)
        } else {
            self.notify(ctx, MessageKey::MoreTasks).await?;
            Ok(StepOutcome::Continue)
        }
    }

    /// Move queued tasks whose title the user has ignored to verification.
    async fn filter_queue(&mut self, ctx: &EngineContext, now: DateTime<Utc>) -> Result<()> {
        let ignored = ctx.ignore_list.ignored_for(&self.user.name, now).await?;
        if ignored.is_empty() {
            return Ok(());
        }

        let mut kept = VecDeque::with_capacity(self.queue.len());
        let mut failure = None;
        for mut task in self.queue.drain(..) {
            let Some(entry) = ignored.get(&task.title) else {
                kept.push_back(task);
                continue;
            };
            info!(user = %self.user.name, title = %task.title, "ignoring task");
            task.comment.clone_from(&entry.reason);
            match task.set_verifying(ctx.tasks.as_ref()).await {
                Ok(()) => ctx.audit(
                    AuditEntry::for_task(AuditEventType::Suppressed, &task)
                        .with_detail(&entry.reason),
                ),
                Err(err) => {
                    kept.push_back(task);
                    failure.get_or_insert(err);
                }
            }
        }
        self.queue = kept;
        failure.map_or(Ok(()), Err)
    }

    fn current_task(&self) -> Result<&Task> {
        self.current
            .as_ref()
            .ok_or_else(|| AppError::NotFound(format!("{} has no task in focus", self.user.name)))
    }

    fn current_task_mut(&mut self) -> Result<&mut Task> {
        let name = &self.user.name;
        self.current
            .as_mut()
            .ok_or_else(|| AppError::NotFound(format!("{name} has no task in focus")))
    }
}
