//! Pure per-user state transition function.
//!
//! [`transition`] looks only at the current [`SessionState`] and a
//! [`Snapshot`] of the session, and returns the next state together with
//! the side effects to perform, as data. The session applies the effects
//! in order; if any of them fails the state is not advanced and the same
//! transition is attempted again on the next tick.

use crate::auth::AuthState;
use crate::messages::MessageKey;

/// Where a user is in the verification conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for a queued task.
    #[default]
    NeedTask,
    /// Asked whether the user performed the action.
    ActionPerformedCheck,
    /// Asked whether a 2FA push may be sent.
    AuthPermissionCheck,
    /// Push sent; polling for the result.
    WaitingOnAuth,
    /// Current task is answered and ready to be closed.
    TaskFinished,
}

impl SessionState {
    /// Stable name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedTask => "need_task",
            Self::ActionPerformedCheck => "action_performed_check",
            Self::AuthPermissionCheck => "auth_permission_check",
            Self::WaitingOnAuth => "waiting_on_auth",
            Self::TaskFinished => "task_finished",
        }
    }
}

/// Inputs the transition guards read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// A task is in focus or waiting in the queue.
    pub task_available: bool,
    /// Latest yes/no answer, if the user has given one.
    pub answer: Option<bool>,
    /// The user has a push-capable second factor.
    pub can_challenge: bool,
    /// A push was approved within the reauthentication window.
    pub recently_authenticated: bool,
    /// Latest observed MFA state.
    pub auth_state: AuthState,
    /// The escalation deadline has passed.
    pub deadline_passed: bool,
}

/// Which reporting-channel post to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// User said they did not perform the action; carries their comment.
    NotPerformed,
    /// User refused the push.
    DeclinedMfa,
    /// Push was rejected or timed out.
    FailedMfa,
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Take the next queued task into focus, alert the user, start the
    /// escalation deadline.
    BeginTask,
    /// Copy the answer and comment onto the current task and clear them.
    RecordResponse,
    /// Discard the latest answer.
    ClearResponse,
    /// Mark the current task as confirmed by a recent second factor.
    MarkAuthenticated,
    /// Send a message to the user.
    Notify(MessageKey),
    /// Post to the reporting channel.
    Report(Report),
    /// Move the current task to verification.
    Verify,
    /// Deadline lapsed: report, annotate, verify, stop the deadline.
    AutoEscalate,
    /// Send a push.
    BeginChallenge,
    /// Store the settled push result on the task and tell the user.
    RecordAuthResult,
    /// Close the current task and announce what comes next.
    FinishTask,
}

/// The outcome of a matching guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the effects are applied.
    pub next: SessionState,
    /// Effects to apply, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: SessionState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

/// Evaluate the guards for `state` in priority order.
///
/// Returns `None` when no guard matches; the session then stays where it
/// is. An unparseable reply leaves `answer` unset, so it never fires a
/// guard on its own.
#[must_use]
pub fn transition(state: SessionState, snap: &Snapshot) -> Option<Transition> {
    use Effect::{
        AutoEscalate, BeginChallenge, BeginTask, ClearResponse, FinishTask, MarkAuthenticated,
        Notify, RecordAuthResult, RecordResponse, Verify,
    };
    use SessionState::{
        ActionPerformedCheck, AuthPermissionCheck, NeedTask, TaskFinished, WaitingOnAuth,
    };

    match state {
        NeedTask if snap.task_available => {
            Some(Transition::to(ActionPerformedCheck, vec![BeginTask]))
        }
        NeedTask => None,

        ActionPerformedCheck => match snap.answer {
            Some(true) if snap.recently_authenticated => Some(Transition::to(
                TaskFinished,
                vec![RecordResponse, MarkAuthenticated],
            )),
            Some(true) if !snap.can_challenge => Some(Transition::to(
                TaskFinished,
                vec![RecordResponse, Notify(MessageKey::No2fa)],
            )),
            Some(true) => Some(Transition::to(
                AuthPermissionCheck,
                vec![RecordResponse, Notify(MessageKey::TwoFa)],
            )),
            Some(false) => Some(Transition::to(
                TaskFinished,
                vec![
                    Notify(MessageKey::Escalated),
                    Effect::Report(Report::NotPerformed),
                    RecordResponse,
                    Verify,
                ],
            )),
            None if snap.deadline_passed => Some(Transition::to(
                TaskFinished,
                vec![AutoEscalate, RecordResponse],
            )),
            None => None,
        },

        AuthPermissionCheck => match snap.answer {
            Some(true) => Some(Transition::to(
                WaitingOnAuth,
                vec![
                    ClearResponse,
                    Notify(MessageKey::SendingPush),
                    BeginChallenge,
                ],
            )),
            Some(false) => Some(Transition::to(
                TaskFinished,
                vec![
                    Notify(MessageKey::Escalated),
                    Effect::Report(Report::DeclinedMfa),
                    Verify,
                    ClearResponse,
                ],
            )),
            None if snap.deadline_passed => {
                Some(Transition::to(TaskFinished, vec![AutoEscalate, ClearResponse]))
            }
            None => None,
        },

        WaitingOnAuth => match snap.auth_state {
            AuthState::Authorized => Some(Transition::to(TaskFinished, vec![RecordAuthResult])),
            AuthState::Denied => Some(Transition::to(
                TaskFinished,
                vec![
                    RecordAuthResult,
                    Effect::Report(Report::FailedMfa),
                    Verify,
                ],
            )),
            AuthState::None | AuthState::Pending => None,
        },

        TaskFinished => Some(Transition::to(NeedTask, vec![FinishTask])),
    }
}
