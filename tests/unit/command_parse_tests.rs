//! Unit tests for direct-message command parsing.

use securitybot::engine::commands::{parse, split_args, Command};

#[test]
fn affirmative_words_carry_the_comment() {
    for word in ["yes", "y", "yep", "yeah", "sure", "YES", "Yes,", "yes!"] {
        assert_eq!(
            parse(&format!("{word} that was me")),
            Command::Yes("that was me".into()),
            "word: {word}"
        );
    }
}

#[test]
fn negative_words_carry_the_comment() {
    for word in ["no", "n", "nope", "nah", "No."] {
        assert_eq!(
            parse(&format!("{word} not me")),
            Command::No("not me".into()),
            "word: {word}"
        );
    }
}

#[test]
fn bare_answer_has_empty_comment() {
    assert_eq!(parse("  NO  "), Command::No(String::new()));
    assert_eq!(parse("y"), Command::Yes(String::new()));
}

#[test]
fn comment_whitespace_is_trimmed_but_inner_spacing_kept() {
    assert_eq!(
        parse("yes   on my  laptop  "),
        Command::Yes("on my  laptop".into())
    );
}

#[test]
fn greeting_and_help_are_equivalent() {
    assert_eq!(parse("hi"), Command::Help);
    assert_eq!(parse("Hi!"), Command::Help);
    assert_eq!(parse("help me please"), Command::Help);
}

#[test]
fn ignore_reads_hours_and_reason() {
    assert_eq!(
        parse("ignore 4 travelling this week"),
        Command::Ignore {
            hours: Some(4),
            reason: "travelling this week".into(),
        }
    );
}

#[test]
fn ignore_keeps_quoted_reason_together() {
    assert_eq!(
        parse("ignore 2 \"on call\" rotation"),
        Command::Ignore {
            hours: Some(2),
            reason: "on call rotation".into(),
        }
    );
}

#[test]
fn ignore_accepts_smart_quotes() {
    assert_eq!(
        parse("ignore 8 \u{201c}new laptop\u{201d}"),
        Command::Ignore {
            hours: Some(8),
            reason: "new laptop".into(),
        }
    );
}

#[test]
fn ignore_without_positive_hours_has_none() {
    for text in ["ignore", "ignore 0", "ignore -3 nope", "ignore soon", "ignore 1.5"] {
        let Command::Ignore { hours, .. } = parse(text) else {
            panic!("expected ignore for {text}");
        };
        assert_eq!(hours, None, "text: {text}");
    }
}

#[test]
fn management_commands_are_recognized() {
    assert_eq!(parse("add_to_blacklist"), Command::AddToBlacklist);
    assert_eq!(parse("remove_from_blacklist"), Command::RemoveFromBlacklist);
    assert_eq!(parse("test"), Command::Test);
}

#[test]
fn anything_else_is_unknown() {
    for text in ["", "   ", "yesterday", "maybe", "nobody", "y'all"] {
        assert_eq!(parse(text), Command::Unknown, "text: {text:?}");
    }
}

#[test]
fn dashes_in_comments_are_normalized() {
    assert_eq!(
        parse("no \u{2014} definitely not"),
        Command::No("-- definitely not".into())
    );
}

#[test]
fn split_args_honors_both_quote_styles() {
    assert_eq!(
        split_args("a 'b c' \"d e\" f"),
        vec!["a", "b c", "d e", "f"]
    );
    assert!(split_args("   ").is_empty());
}

#[test]
fn split_args_falls_back_on_unbalanced_quotes() {
    assert_eq!(split_args("it's fine"), vec!["it's", "fine"]);
}
