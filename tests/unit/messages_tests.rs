//! Unit tests for message templates and overrides.

use std::collections::HashMap;

use securitybot::messages::{quote, MessageKey, Messages};
use securitybot::AppError;

#[test]
fn every_key_has_a_distinct_name_and_default() {
    let messages = Messages::default();
    let mut names: Vec<_> = MessageKey::ALL.iter().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), MessageKey::ALL.len());

    for key in MessageKey::ALL {
        assert!(!messages.get(key).is_empty(), "empty default for {key}");
        assert_eq!(MessageKey::from_name(key.as_str()), Some(key));
    }
}

#[test]
fn configuration_names_are_stable() {
    assert_eq!(MessageKey::TwoFa.as_str(), "2fa");
    assert_eq!(MessageKey::No2fa.as_str(), "no_2fa");
    assert_eq!(MessageKey::MoreTasks.as_str(), "bwtm");
    assert_eq!(MessageKey::ReportNoResponse.as_str(), "report_noresponse");
    assert_eq!(MessageKey::from_name("nonsense"), None);
}

#[test]
fn render_substitutes_placeholders() {
    let messages = Messages::default();
    assert_eq!(
        messages.render(MessageKey::Greeting, &[("name", "Alice")]),
        "Hi there Alice!"
    );
    assert_eq!(
        messages.render(
            MessageKey::IgnoreOk,
            &[("title", "Suspicious login"), ("hours", "4")]
        ),
        "Okay, I'll ignore *Suspicious login* for 4 hours."
    );
}

#[test]
fn render_leaves_unknown_placeholders() {
    let messages = Messages::default();
    assert_eq!(messages.render(MessageKey::Greeting, &[]), "Hi there {name}!");
    assert_eq!(
        messages.render(MessageKey::Greeting, &[("other", "x")]),
        "Hi there {name}!"
    );
}

#[test]
fn substituted_values_are_not_expanded_again() {
    let text = Messages::default().render(
        MessageKey::Report,
        &[
            ("username", "alice"),
            ("title", "{description}"),
            ("description", "Login from Lagos"),
            ("comment", "see {url} and {title}"),
            ("url", "https://alerts.example.com/1"),
        ],
    );
    assert_eq!(
        text,
        "*alice* needs follow-up on *{description}*\nLogin from Lagos\nsee {url} and {title}\nhttps://alerts.example.com/1"
    );
}

#[test]
fn stray_braces_survive_rendering() {
    let overrides = HashMap::from([(
        "bye".to_owned(),
        "{ {name} } {".to_owned(),
    )]);
    let messages = Messages::with_overrides(&overrides).unwrap();
    assert_eq!(messages.render(MessageKey::Bye, &[("name", "Bob")]), "{ Bob } {");
}

#[test]
fn report_template_carries_every_field() {
    let text = Messages::default().render(
        MessageKey::Report,
        &[
            ("username", "alice"),
            ("title", "Suspicious login"),
            ("description", "Login from Lagos"),
            ("comment", "not me"),
            ("url", "N/A"),
        ],
    );
    assert_eq!(
        text,
        "*alice* needs follow-up on *Suspicious login*\nLogin from Lagos\nnot me\nN/A"
    );
}

#[test]
fn overrides_replace_only_named_templates() {
    let overrides = HashMap::from([("bye".to_owned(), "Cheers, {name}".to_owned())]);
    let messages = Messages::with_overrides(&overrides).unwrap();

    assert_eq!(
        messages.render(MessageKey::Bye, &[("name", "Bob")]),
        "Cheers, Bob"
    );
    assert_eq!(
        messages.get(MessageKey::Help),
        Messages::default().get(MessageKey::Help)
    );
}

#[test]
fn unknown_override_key_is_config_error() {
    let overrides = HashMap::from([("goodbye".to_owned(), "x".to_owned())]);
    let err = Messages::with_overrides(&overrides).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("goodbye")));
}

#[test]
fn quote_prefixes_each_line() {
    assert_eq!(quote("New IP\nNew device"), "> New IP\n> New device");
    assert_eq!(quote("single"), "> single");
}
