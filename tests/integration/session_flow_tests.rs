//! End-to-end conversation flows for a single [`Session`].
//!
//! Each test drives one session step by step against the fake chat and MFA
//! providers and checks what the user was told, what the security channel
//! saw, and what ended up in storage.

use chrono::Duration;
use securitybot::audit::AuditEventType;
use securitybot::auth::AuthState;
use securitybot::engine::{AuthRecord, Session, SessionState, StepOutcome};
use securitybot::messages::MessageKey;
use securitybot::models::task::TaskStatus;

use super::test_helpers::{alice, noon, FakeChat, FakeMfa, Harness};

const TITLE: &str = "Suspicious login";

async fn harness(mfa: FakeMfa) -> Harness {
    Harness::new(FakeChat::with_users(vec![alice()]), mfa).await
}

/// Session for alice with one assigned task already stepped into
/// `ActionPerformedCheck`.
async fn prompted_session(h: &Harness) -> (Session, String) {
    let task = h.assigned_alert("alice", TITLE).await;
    let hash = task.hash.clone();
    let factor = h
        .ctx
        .mfa
        .can_challenge(&alice())
        .await
        .expect("capability lookup");
    let mut session = Session::new(alice(), factor, AuthRecord::default());
    session.enqueue(&h.ctx, task, noon()).await.expect("enqueue");

    let outcome = session.step(&h.ctx, noon()).await.expect("step");
    assert_eq!(outcome, StepOutcome::Continue);
    assert_eq!(session.state(), SessionState::ActionPerformedCheck);
    (session, hash)
}

// ── Alerting ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn beginning_a_task_greets_and_describes_the_alert() {
    let h = harness(FakeMfa::default()).await;
    let (session, hash) = prompted_session(&h).await;

    let sent = h.chat.direct_to("U_ALICE");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], "Hi there Alice!");
    assert!(sent[1].contains("*Suspicious login from a new device*"));
    assert!(sent[1].contains("> Login from 203.0.113.7"));
    assert!(sent[1].ends_with(h.ctx.messages.get(MessageKey::ActionPrompt)));

    assert_eq!(session.current().map(|t| t.hash.as_str()), Some(hash.as_str()));
    assert_eq!(session.deadline(), Some(noon() + Duration::hours(2)));
    assert_eq!(h.audit.count(AuditEventType::TaskAssigned), 1);
}

#[tokio::test]
async fn unparseable_reply_leaves_session_in_place() {
    let h = harness(FakeMfa::default()).await;
    let (mut session, _) = prompted_session(&h).await;

    let later = noon() + Duration::minutes(30);
    let outcome = session.step(&h.ctx, later).await.expect("step");

    assert_eq!(outcome, StepOutcome::Continue);
    assert_eq!(session.state(), SessionState::ActionPerformedCheck);
    assert_eq!(h.chat.direct_to("U_ALICE").len(), 2);
}

// ── Answers ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_answer_reports_once_and_skips_mfa() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, hash) = prompted_session(&h).await;

    session.negative_response("never seen this device");
    session.step(&h.ctx, noon()).await.expect("step");

    assert_eq!(session.state(), SessionState::TaskFinished);
    let reports = h.chat.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("*alice* needs follow-up on *Suspicious login*"));
    assert!(reports[0].contains("> never seen this device"));
    assert!(h.mfa.challenges().is_empty());

    let stored = h.stored(&hash).await.expect("task still stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert_eq!(stored.performed, Some(false));
    assert_eq!(stored.comment, "never seen this device");

    let outcome = session.step(&h.ctx, noon()).await.expect("finish");
    assert_eq!(outcome, StepOutcome::Deactivate);
    assert_eq!(session.state(), SessionState::NeedTask);
    assert_eq!(h.chat.reports().len(), 1);
    assert!(h.stored(&hash).await.is_none());
    assert_eq!(h.audit.count(AuditEventType::Denied), 1);
}

#[tokio::test]
async fn no_answer_without_comment_reports_placeholder() {
    let h = harness(FakeMfa::default()).await;
    let (mut session, _) = prompted_session(&h).await;

    session.negative_response("");
    session.step(&h.ctx, noon()).await.expect("step");

    let reports = h.chat.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("> No comment provided."));
}

#[tokio::test]
async fn yes_without_second_factor_finishes_unauthenticated() {
    let h = harness(FakeMfa::default()).await;
    let (mut session, hash) = prompted_session(&h).await;

    session.positive_response("that was me");
    session.step(&h.ctx, noon()).await.expect("step");

    assert_eq!(session.state(), SessionState::TaskFinished);
    let current = session.current().expect("task in focus");
    assert_eq!(current.performed, Some(true));
    assert!(!current.authenticated);
    let sent = h.chat.direct_to("U_ALICE");
    assert_eq!(sent.last().map(String::as_str), Some(h.ctx.messages.get(MessageKey::No2fa)));
    assert!(h.chat.reports().is_empty());

    let outcome = session.step(&h.ctx, noon()).await.expect("finish");
    assert_eq!(outcome, StepOutcome::Deactivate);
    assert!(h.stored(&hash).await.is_none());

    let ignored = h
        .ctx
        .ignore_list
        .ignored_for("alice", noon())
        .await
        .expect("ignored");
    let entry = ignored.get(TITLE).expect("backoff entry");
    assert_eq!(entry.reason, "auto backoff after confirmation");
    assert_eq!(entry.until, noon() + Duration::hours(4));
}

#[tokio::test]
async fn answer_is_consumed_when_leaving_a_state() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, _) = prompted_session(&h).await;

    session.positive_response("me");
    session.step(&h.ctx, noon()).await.expect("step");
    assert_eq!(session.state(), SessionState::AuthPermissionCheck);
    assert_eq!(session.response().answer, None);

    // The earlier "yes" must not be read as consent to the push.
    session.step(&h.ctx, noon()).await.expect("step");
    assert_eq!(session.state(), SessionState::AuthPermissionCheck);
    assert!(h.mfa.challenges().is_empty());
}

// ── Escalation deadline ──────────────────────────────────────────────────────

#[tokio::test]
async fn silence_past_deadline_escalates() {
    let h = harness(FakeMfa::default()).await;
    let (mut session, hash) = prompted_session(&h).await;
    let deadline = session.deadline().expect("deadline set");

    session.step(&h.ctx, deadline).await.expect("step at deadline");
    assert_eq!(session.state(), SessionState::ActionPerformedCheck);

    session
        .step(&h.ctx, deadline + Duration::seconds(1))
        .await
        .expect("step after deadline");

    assert_eq!(session.state(), SessionState::TaskFinished);
    assert_eq!(session.deadline(), None);
    let reports = h.chat.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("*alice* did not respond to *Suspicious login*"));
    let sent = h.chat.direct_to("U_ALICE");
    assert_eq!(
        sent.last().map(String::as_str),
        Some(h.ctx.messages.get(MessageKey::NoResponse))
    );

    let stored = h.stored(&hash).await.expect("task still stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert_eq!(stored.comment, "Auto escalated. No response received.");
    assert_eq!(h.audit.count(AuditEventType::AutoEscalated), 1);
}

#[tokio::test]
async fn silence_while_asked_for_push_escalates() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, hash) = prompted_session(&h).await;
    let deadline = session.deadline().expect("deadline set");

    session.positive_response("");
    session.step(&h.ctx, noon()).await.expect("step");
    assert_eq!(session.state(), SessionState::AuthPermissionCheck);

    session
        .step(&h.ctx, deadline + Duration::minutes(1))
        .await
        .expect("step after deadline");

    assert_eq!(session.state(), SessionState::TaskFinished);
    let stored = h.stored(&hash).await.expect("task still stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert_eq!(stored.performed, Some(true));
    assert!(h.mfa.challenges().is_empty());
}

// ── Second factor ────────────────────────────────────────────────────────────

#[tokio::test]
async fn approved_push_authenticates_the_task() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, _) = prompted_session(&h).await;

    session.positive_response("me");
    session.step(&h.ctx, noon()).await.expect("to permission check");
    session.positive_response("");
    session.step(&h.ctx, noon()).await.expect("to waiting");

    assert_eq!(session.state(), SessionState::WaitingOnAuth);
    assert_eq!(
        h.mfa.challenges(),
        vec![("alice".to_owned(), "Suspicious login from a new device".to_owned())]
    );

    h.mfa.set_status(AuthState::Pending);
    session.step(&h.ctx, noon()).await.expect("still waiting");
    assert_eq!(session.state(), SessionState::WaitingOnAuth);

    let approved_at = noon() + Duration::seconds(20);
    h.mfa.set_status(AuthState::Authorized);
    session.step(&h.ctx, approved_at).await.expect("approved");

    assert_eq!(session.state(), SessionState::TaskFinished);
    assert!(session.current().expect("task").authenticated);
    assert_eq!(session.auth_record().authed_at, Some(approved_at));
    let sent = h.chat.direct_to("U_ALICE");
    assert_eq!(
        sent.last().map(String::as_str),
        Some(h.ctx.messages.get(MessageKey::GoodAuth))
    );
    assert!(h.chat.reports().is_empty());
}

#[tokio::test]
async fn recent_push_satisfies_next_confirmation() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, _) = prompted_session(&h).await;
    let second = h.assigned_alert("alice", "New API key").await;
    session.enqueue(&h.ctx, second, noon()).await.expect("enqueue");

    session.positive_response("");
    session.step(&h.ctx, noon()).await.expect("to permission check");
    session.positive_response("");
    session.step(&h.ctx, noon()).await.expect("to waiting");
    h.mfa.set_status(AuthState::Authorized);
    session.step(&h.ctx, noon()).await.expect("approved");

    let outcome = session.step(&h.ctx, noon()).await.expect("finish first");
    assert_eq!(outcome, StepOutcome::Continue);
    assert_eq!(
        h.chat.direct_to("U_ALICE").last().map(String::as_str),
        Some(h.ctx.messages.get(MessageKey::MoreTasks))
    );

    let later = noon() + Duration::minutes(10);
    session.step(&h.ctx, later).await.expect("begin second");
    assert_eq!(session.current().map(|t| t.title.as_str()), Some("New API key"));

    session.positive_response("also me");
    session.step(&h.ctx, later).await.expect("confirm second");

    assert_eq!(session.state(), SessionState::TaskFinished);
    assert!(session.current().expect("task").authenticated);
    assert_eq!(h.mfa.challenges().len(), 1);
}

#[tokio::test]
async fn stale_push_requires_a_new_challenge() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let task = h.assigned_alert("alice", TITLE).await;
    let record = AuthRecord {
        state: AuthState::Authorized,
        authed_at: Some(noon() - Duration::hours(3)),
    };
    let mut session = Session::new(alice(), Some("push-alice".into()), record);
    session.enqueue(&h.ctx, task, noon()).await.expect("enqueue");
    session.step(&h.ctx, noon()).await.expect("begin");

    session.positive_response("");
    session.step(&h.ctx, noon()).await.expect("step");

    assert_eq!(session.state(), SessionState::AuthPermissionCheck);
}

#[tokio::test]
async fn rejected_push_escalates_and_resets_provider() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, hash) = prompted_session(&h).await;

    session.positive_response("me");
    session.step(&h.ctx, noon()).await.expect("to permission check");
    session.positive_response("");
    session.step(&h.ctx, noon()).await.expect("to waiting");
    h.mfa.set_status(AuthState::Denied);
    session.step(&h.ctx, noon()).await.expect("denied");

    assert_eq!(session.state(), SessionState::TaskFinished);
    assert_eq!(session.auth_record(), AuthRecord::default());
    assert_eq!(h.mfa.resets(), vec!["alice".to_owned()]);

    let reports = h.chat.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("did not pass 2FA"));

    let stored = h.stored(&hash).await.expect("task still stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert!(!stored.authenticated);
    assert_eq!(h.audit.count(AuditEventType::MfaFailed), 1);
}

#[tokio::test]
async fn declining_the_push_escalates() {
    let h = harness(FakeMfa::with_push_for(&["alice"])).await;
    let (mut session, hash) = prompted_session(&h).await;

    session.positive_response("me");
    session.step(&h.ctx, noon()).await.expect("to permission check");
    session.negative_response("");
    session.step(&h.ctx, noon()).await.expect("declined");

    assert_eq!(session.state(), SessionState::TaskFinished);
    assert!(h.mfa.challenges().is_empty());
    let reports = h.chat.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("> User not comfortable performing MFA check."));
    let stored = h.stored(&hash).await.expect("task still stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert_eq!(h.audit.count(AuditEventType::MfaDeclined), 1);
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_effect_leaves_session_untouched() {
    let h = harness(FakeMfa::default()).await;
    let task = h.assigned_alert("alice", TITLE).await;
    let mut session = Session::new(alice(), None, AuthRecord::default());
    session.enqueue(&h.ctx, task, noon()).await.expect("enqueue");

    h.chat.fail_direct_to("U_ALICE");
    assert!(session.step(&h.ctx, noon()).await.is_err());
    assert_eq!(session.state(), SessionState::NeedTask);
    assert!(session.current().is_none());
    assert_eq!(session.queued().count(), 1);
    assert_eq!(session.deadline(), None);

    h.chat.clear_failures();
    session.step(&h.ctx, noon()).await.expect("retry succeeds");
    assert_eq!(session.state(), SessionState::ActionPerformedCheck);
    assert_eq!(session.queued().count(), 0);
}

// ── Ignore list ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn ignored_titles_are_moved_to_verification_on_enqueue() {
    let h = harness(FakeMfa::default()).await;
    h.ctx
        .ignore_list
        .ignore("alice", TITLE, "known VPN", noon() + Duration::hours(1))
        .await
        .expect("ignore");

    let task = h.assigned_alert("alice", TITLE).await;
    let hash = task.hash.clone();
    let mut session = Session::new(alice(), None, AuthRecord::default());
    session.enqueue(&h.ctx, task, noon()).await.expect("enqueue");

    assert!(session.is_idle());
    let stored = h.stored(&hash).await.expect("task still stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert_eq!(stored.comment, "known VPN");
    assert_eq!(h.audit.count(AuditEventType::Suppressed), 1);
}

#[tokio::test]
async fn confirming_one_alert_suppresses_queued_duplicates() {
    let h = harness(FakeMfa::default()).await;
    let (mut session, _) = prompted_session(&h).await;
    let duplicate = h.assigned_alert("alice", TITLE).await;
    let duplicate_hash = duplicate.hash.clone();
    session.enqueue(&h.ctx, duplicate, noon()).await.expect("enqueue");
    assert_eq!(session.queued().count(), 1);

    session.positive_response("me");
    session.step(&h.ctx, noon()).await.expect("confirm");
    let outcome = session.step(&h.ctx, noon()).await.expect("finish");

    assert_eq!(outcome, StepOutcome::Deactivate);
    assert_eq!(session.queued().count(), 0);
    let stored = h.stored(&duplicate_hash).await.expect("duplicate stored");
    assert_eq!(stored.status, TaskStatus::Verification);
    assert_eq!(stored.comment, "auto backoff after confirmation");
    assert_eq!(
        h.chat.direct_to("U_ALICE").last().map(String::as_str),
        Some(h.ctx.messages.get(MessageKey::Bye))
    );
}
