//! Parsing of direct messages into bot commands.

use std::sync::LazyLock;

use regex::Regex;

/// Characters people tack onto command words that never belong to a name.
static PUNCTUATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"[.,!?'"`]"#).ok());

/// A parsed direct message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Affirmative answer with an optional comment.
    Yes(String),
    /// Negative answer with an optional comment.
    No(String),
    /// Ask for the command list.
    Help,
    /// Suppress the current alert's title for `hours`.
    Ignore {
        /// Requested duration; `None` if missing or not a positive number.
        hours: Option<u32>,
        /// Optional reason.
        reason: String,
    },
    /// Opt out of alerts.
    AddToBlacklist,
    /// Opt back into alerts.
    RemoveFromBlacklist,
    /// Create a test alert for the sender.
    Test,
    /// Anything else.
    Unknown,
}

/// Normalize characters that chat clients auto-format: smart quotes
/// become ASCII quotes and en/em dashes become `--`.
#[must_use]
pub fn clean_input(text: &str) -> String {
    text.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2013}', '\u{2014}'], "--")
}

/// Lower-case a command word and strip punctuation from it.
#[must_use]
pub fn clean_command(word: &str) -> String {
    let lower = word.to_lowercase();
    match PUNCTUATION.as_ref() {
        Some(re) => re.replace_all(&lower, "").into_owned(),
        None => lower,
    }
}

/// Split on whitespace, keeping single- or double-quoted runs together.
/// Unbalanced quotes fall back to a plain whitespace split.
#[must_use]
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return text.split_whitespace().map(str::to_owned).collect();
    }
    if in_word {
        args.push(current);
    }
    args
}

/// Parse one inbound message.
#[must_use]
pub fn parse(text: &str) -> Command {
    let text = clean_input(text);
    let trimmed = text.trim();
    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(head, rest)| (head, rest.trim()));

    match clean_command(head).as_str() {
        "yes" | "y" | "yep" | "yeah" | "sure" => Command::Yes(rest.to_owned()),
        "no" | "n" | "nope" | "nah" => Command::No(rest.to_owned()),
        "hi" | "help" => Command::Help,
        "ignore" => {
            let args = split_args(rest);
            let hours = args
                .first()
                .and_then(|raw| raw.parse::<u32>().ok())
                .filter(|hours| *hours > 0);
            let reason = args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
            Command::Ignore { hours, reason }
        }
        "add_to_blacklist" => Command::AddToBlacklist,
        "remove_from_blacklist" => Command::RemoveFromBlacklist,
        "test" => Command::Test,
        _ => Command::Unknown,
    }
}
