//! Central cooperative loop.
//!
//! One [`Dispatcher`] owns every active [`Session`]. Each tick it
//!
//! 1. pulls OPEN tasks from the store when the poll interval has elapsed,
//! 2. drains inbound direct messages,
//! 3. steps every session once.
//!
//! Ingestion always precedes stepping, so a task added during a tick is
//! advanced at most one transition before the next tick.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::audit::{AuditEntry, AuditEventType};
use crate::chat::{ChatEvent, Directory};
use crate::messages::MessageKey;
use crate::models::task::{NewAlert, Task, TaskStatus};
use crate::models::user::ChatUser;
use crate::persistence::blacklist::Blacklist;
use crate::time_budget::expires_at;
use crate::Result;

use super::commands::{self, Command};
use super::session::{AuthRecord, Session, StepOutcome};
use super::EngineContext;

const INVALID_USER_COMMENT: &str = "invalid user";
const BLACKLISTED_COMMENT: &str = "blacklisted";
const USER_IGNORE_REASON: &str = "ignored by user";
/// Longest window a user may ignore a title for: one year.
const MAX_IGNORE_HOURS: u32 = 8_760;

/// Owns all sessions and drives them on a fixed tick.
pub struct Dispatcher {
    ctx: EngineContext,
    blacklist: Blacklist,
    directory: Directory,
    sessions: BTreeMap<String, Session>,
    auth_records: HashMap<String, AuthRecord>,
    poll_interval: Duration,
    last_poll: Option<DateTime<Utc>>,
}

impl Dispatcher {
    /// Build a dispatcher and load the chat directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the directory cannot be listed.
    pub async fn new(
        ctx: EngineContext,
        blacklist: Blacklist,
        poll_interval: Duration,
    ) -> Result<Self> {
        let users = ctx.chat.list_directory().await?;
        let directory = Directory::new(users);
        info!(users = directory.len(), "chat directory loaded");
        Ok(Self {
            ctx,
            blacklist,
            directory,
            sessions: BTreeMap::new(),
            auth_records: HashMap::new(),
            poll_interval,
            last_poll: None,
        })
    }

    /// Shared collaborators and policy.
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Current blacklist.
    #[must_use]
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Session for a chat user id.
    #[must_use]
    pub fn session(&self, user_id: &str) -> Option<&Session> {
        self.sessions.get(user_id)
    }

    /// Number of active sessions.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Re-assign tasks left `in_progress` by a previous run.
    ///
    /// # Errors
    ///
    /// Returns a store error if the in-progress tasks cannot be loaded.
    /// Failures for individual tasks are logged and skipped.
    pub async fn recover(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let tasks = self.ctx.tasks.tasks_with_status(TaskStatus::InProgress).await?;
        let count = tasks.len();
        for task in tasks {
            info!(user = %task.username, hash = %task.hash, "recovering task");
            self.dispatch(task, now).await;
        }
        Ok(count)
    }

    /// Run one tick at `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        async {
            if self.last_poll.is_none_or(|last| now - last >= self.poll_interval) {
                self.last_poll = Some(now);
                self.poll_open_tasks(now).await;
            }
            self.handle_messages(now).await;
            self.step_sessions(now).await;
        }
        .instrument(debug_span!("tick"))
        .await;
    }

    /// Tick every `tick` until `cancel` fires.
    pub async fn run(&mut self, tick: std::time::Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(active = self.sessions.len(), "dispatcher running");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(active = self.sessions.len(), "dispatcher stopping");
                    break;
                }
                _ = interval.tick() => self.tick(Utc::now()).await,
            }
        }
    }

    /// Route `task` to its owner's session, or straight to verification
    /// when the owner is unknown or blacklisted.
    ///
    /// # Errors
    ///
    /// Returns a collaborator error. A task whose capability lookup fails
    /// is left untouched and will be retried on the next poll.
    pub async fn add_task(&mut self, mut task: Task, now: DateTime<Utc>) -> Result<()> {
        let Some(user) = self.directory.by_name(&task.username).cloned() else {
            warn!(user = %task.username, hash = %task.hash, "invalid user");
            let event = AuditEventType::InvalidUser;
            return self
                .escalate_unassignable(task, INVALID_USER_COMMENT, event, now)
                .await;
        };
        if self.blacklist.contains(&user.name) {
            info!(user = %user.name, hash = %task.hash, "ignoring task for blacklisted user");
            let event = AuditEventType::BlacklistedUser;
            return self
                .escalate_unassignable(task, BLACKLISTED_COMMENT, event, now)
                .await;
        }
        let assigned = self.sessions.get(&user.id);
        if assigned.is_some_and(|session| session.holds(&task.hash)) {
            debug!(user = %user.name, hash = %task.hash, "task already assigned");
            return Ok(());
        }

        let factor = self.ctx.mfa.can_challenge(&user).await?;
        task.set_in_progress(self.ctx.tasks.as_ref()).await?;

        let auth = self.auth_records.get(&user.id).copied().unwrap_or_default();
        let session = self.sessions.entry(user.id.clone()).or_insert_with(|| {
            debug!(user = %user.name, "activating session");
            Session::new(user, None, auth)
        });
        session.set_factor(factor);
        session.enqueue(&self.ctx, task, now).await
    }

    /// Apply one inbound direct message.
    ///
    /// # Errors
    ///
    /// Returns a collaborator error raised while replying or persisting.
    pub async fn handle_message(&mut self, event: ChatEvent, now: DateTime<Utc>) -> Result<()> {
        let Some(user) = self.directory.by_id(&event.user_id).cloned() else {
            debug!(user_id = %event.user_id, "message from unknown user");
            return Ok(());
        };

        let command = commands::parse(&event.text);
        debug!(user = %user.name, ?command, "handling message");
        match command {
            Command::Yes(_) | Command::No(_) if !self.sessions.contains_key(&user.id) => {
                self.reply(&user, MessageKey::NoTask).await
            }
            Command::Yes(text) => {
                if let Some(session) = self.sessions.get_mut(&user.id) {
                    session.positive_response(text);
                }
                Ok(())
            }
            Command::No(text) => {
                if let Some(session) = self.sessions.get_mut(&user.id) {
                    session.negative_response(text);
                }
                Ok(())
            }
            Command::Help => self.reply(&user, MessageKey::Help).await,
            Command::Ignore { hours, reason } => {
                self.ignore_current(&user, hours, &reason, now).await
            }
            Command::AddToBlacklist => {
                if self.blacklist.add(&user.name).await? {
                    info!(user = %user.name, "user added to blacklist");
                }
                self.reply(&user, MessageKey::BlacklistAdded).await
            }
            Command::RemoveFromBlacklist => {
                if self.blacklist.remove(&user.name).await? {
                    info!(user = %user.name, "user removed from blacklist");
                }
                self.reply(&user, MessageKey::BlacklistRemoved).await
            }
            Command::Test => {
                let alert = NewAlert::new(
                    "Testing alert".into(),
                    user.name.clone(),
                    "A test alert requested from chat.".into(),
                    "You asked for a test alert.".into(),
                    None,
                );
                let task = self.ctx.tasks.create(alert).await?;
                info!(user = %user.name, hash = %task.hash, "test alert created");
                self.reply(&user, MessageKey::TestAlert).await
            }
            Command::Unknown => self.reply(&user, MessageKey::BadCommand).await,
        }
    }

    async fn poll_open_tasks(&mut self, now: DateTime<Utc>) {
        let tasks = match self.ctx.tasks.tasks_with_status(TaskStatus::Open).await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(%err, "failed to load open tasks");
                return;
            }
        };
        for task in tasks {
            info!(user = %task.username, hash = %task.hash, "handling new task");
            self.dispatch(task, now).await;
        }
    }

    async fn dispatch(&mut self, task: Task, now: DateTime<Utc>) {
        let hash = task.hash.clone();
        if let Err(err) = self.add_task(task, now).await {
            warn!(%hash, %err, "failed to add task");
        }
    }

    async fn handle_messages(&mut self, now: DateTime<Utc>) {
        let events = match self.ctx.chat.receive_events().await {
            Ok(events) => events,
            Err(err) => {
                warn!(%err, "failed to receive chat events");
                return;
            }
        };
        for event in events {
            let user_id = event.user_id.clone();
            if let Err(err) = self.handle_message(event, now).await {
                warn!(%user_id, %err, "failed to handle message");
            }
        }
    }

    async fn step_sessions(&mut self, now: DateTime<Utc>) {
        let ids: Vec<String> = self.sessions.keys().cloned().collect();
        for id in ids {
            let Some(session) = self.sessions.get_mut(&id) else {
                continue;
            };
            let outcome = match session.step(&self.ctx, now).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        user = %session.user().name,
                        state = session.state().as_str(),
                        %err,
                        "session step failed"
                    );
                    continue;
                }
            };
            if outcome == StepOutcome::Deactivate || session.is_idle() {
                self.deactivate(&id);
            }
        }
    }

    fn deactivate(&mut self, user_id: &str) {
        if let Some(session) = self.sessions.remove(user_id) {
            debug!(user = %session.user().name, "removing session");
            self.auth_records
                .insert(user_id.to_owned(), session.auth_record());
        }
    }

    async fn escalate_unassignable(
        &self,
        mut task: Task,
        comment: &str,
        event: AuditEventType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        task.comment = comment.to_owned();
        task.set_verifying(self.ctx.tasks.as_ref()).await?;
        let until = expires_at(now, self.ctx.backoff_window, &self.ctx.calendar);
        self.ctx
            .ignore_list
            .ignore(&task.username, &task.title, comment, until)
            .await?;
        self.ctx.audit(AuditEntry::for_task(event, &task).at(now));
        Ok(())
    }

    async fn ignore_current(
        &self,
        user: &ChatUser,
        hours: Option<u32>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let title = self
            .sessions
            .get(&user.id)
            .and_then(Session::current)
            .map(|task| task.title.clone());
        let (Some(hours), Some(title)) = (hours, title) else {
            return self.reply(user, MessageKey::IgnoreFailed).await;
        };

        let until = Some(hours)
            .filter(|hours| *hours <= MAX_IGNORE_HOURS)
            .and_then(|hours| Duration::try_hours(i64::from(hours)))
            .and_then(|window| now.checked_add_signed(window));
        let Some(until) = until else {
            debug!(user = %user.name, hours, "ignore window out of range");
            return self.reply(user, MessageKey::IgnoreFailed).await;
        };

        let reason = if reason.is_empty() { USER_IGNORE_REASON } else { reason };
        self.ctx
            .ignore_list
            .ignore(&user.name, &title, reason, until)
            .await?;
        info!(user = %user.name, %title, hours, "alert title ignored");

        let hours = hours.to_string();
        let text = self.ctx.messages.render(
            MessageKey::IgnoreOk,
            &[("title", title.as_str()), ("hours", hours.as_str())],
        );
        self.ctx.chat.send_direct(user, &text).await
    }

    async fn reply(&self, user: &ChatUser, key: MessageKey) -> Result<()> {
        let text = self
            .ctx
            .messages
            .render(key, &[("name", user.greeting_name())]);
        self.ctx.chat.send_direct(user, &text).await
    }
}
