//! Unit tests for the chat directory, user naming, and auth states.

use securitybot::auth::{AuthState, MfaProvider, NullAuth};
use securitybot::chat::Directory;
use securitybot::models::user::ChatUser;

fn users() -> Vec<ChatUser> {
    vec![
        ChatUser {
            id: "U1".into(),
            name: "alice".into(),
            display_name: Some("Alice".into()),
            email: Some("alice@example.com".into()),
        },
        ChatUser::new("U2", "bob"),
    ]
}

#[test]
fn lookup_by_id_and_name() {
    let directory = Directory::new(users());

    assert_eq!(directory.len(), 2);
    assert_eq!(directory.by_id("U2").map(|u| u.name.as_str()), Some("bob"));
    assert_eq!(directory.by_name("alice").map(|u| u.id.as_str()), Some("U1"));
    assert!(directory.by_id("U3").is_none());
    assert!(directory.by_name("carol").is_none());
}

#[test]
fn names_with_whitespace_never_match() {
    let mut list = users();
    list.push(ChatUser::new("U3", "two words"));
    let directory = Directory::new(list);

    assert!(directory.by_name("two words").is_none());
    assert!(directory.by_name(" alice").is_none());
    assert!(directory.by_name("").is_none());
}

#[test]
fn empty_directory() {
    let directory = Directory::default();
    assert!(directory.is_empty());
    assert_eq!(directory.len(), 0);
}

#[test]
fn greeting_prefers_display_name() {
    let [alice, bob]: [ChatUser; 2] = users().try_into().unwrap();
    assert_eq!(alice.greeting_name(), "Alice");
    assert_eq!(bob.greeting_name(), "bob");

    let blank = ChatUser {
        display_name: Some(String::new()),
        ..bob
    };
    assert_eq!(blank.greeting_name(), "bob");
}

#[test]
fn mfa_login_prefers_email() {
    let [alice, bob]: [ChatUser; 2] = users().try_into().unwrap();
    assert_eq!(alice.mfa_login(), "alice@example.com");
    assert_eq!(bob.mfa_login(), "bob");
}

#[test]
fn only_final_auth_states_are_settled() {
    assert!(!AuthState::None.is_settled());
    assert!(!AuthState::Pending.is_settled());
    assert!(AuthState::Authorized.is_settled());
    assert!(AuthState::Denied.is_settled());
}

#[tokio::test]
async fn null_provider_never_challenges() {
    let user = ChatUser::new("U1", "alice");
    let auth = NullAuth;

    assert_eq!(auth.can_challenge(&user).await.unwrap(), None);
    auth.begin_challenge(&user, "test").await.unwrap();
    assert_eq!(auth.poll_status(&user).await.unwrap(), AuthState::None);
    auth.reset(&user).await.unwrap();
}
