//! User-facing message templates.
//!
//! Every string the bot sends comes from a [`Messages`] table. Built-in
//! defaults can be overridden per key from the `[messages]` config table.
//! Templates use `{name}` placeholders filled by [`Messages::render`].

use std::collections::HashMap;
use std::fmt;

use crate::{AppError, Result};

/// Identifies one message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Opening line of every alert.
    Greeting,
    /// Alert body with description and quoted reason.
    Alert,
    /// "Did you do this?" question.
    ActionPrompt,
    /// Confirmation accepted without a second factor.
    No2fa,
    /// Request for permission to send a push.
    TwoFa,
    /// Push is on its way.
    SendingPush,
    /// Push approved.
    GoodAuth,
    /// Push rejected or timed out.
    BadAuth,
    /// Alert handed to the security team after a "no".
    Escalated,
    /// Alert handed to the security team after silence.
    NoResponse,
    /// Another alert is queued.
    MoreTasks,
    /// Queue drained.
    Bye,
    /// Reporting-channel post for an escalated answer.
    Report,
    /// Reporting-channel post for an unanswered alert.
    ReportNoResponse,
    /// Reporting-channel post for a failed push.
    ReportBadAuth,
    /// Reply to an unknown command.
    BadCommand,
    /// Reply to yes/no from a user with nothing pending.
    NoTask,
    /// Command overview.
    Help,
    /// `ignore` accepted.
    IgnoreOk,
    /// `ignore` rejected.
    IgnoreFailed,
    /// Sender added to the blacklist.
    BlacklistAdded,
    /// Sender removed from the blacklist.
    BlacklistRemoved,
    /// `test` alert queued.
    TestAlert,
}

impl MessageKey {
    /// Every key, in declaration order.
    pub const ALL: [Self; 23] = [
        Self::Greeting,
        Self::Alert,
        Self::ActionPrompt,
        Self::No2fa,
        Self::TwoFa,
        Self::SendingPush,
        Self::GoodAuth,
        Self::BadAuth,
        Self::Escalated,
        Self::NoResponse,
        Self::MoreTasks,
        Self::Bye,
        Self::Report,
        Self::ReportNoResponse,
        Self::ReportBadAuth,
        Self::BadCommand,
        Self::NoTask,
        Self::Help,
        Self::IgnoreOk,
        Self::IgnoreFailed,
        Self::BlacklistAdded,
        Self::BlacklistRemoved,
        Self::TestAlert,
    ];

    /// Name used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Alert => "alert",
            Self::ActionPrompt => "action_prompt",
            Self::No2fa => "no_2fa",
            Self::TwoFa => "2fa",
            Self::SendingPush => "sending_push",
            Self::GoodAuth => "good_auth",
            Self::BadAuth => "bad_auth",
            Self::Escalated => "escalated",
            Self::NoResponse => "no_response",
            Self::MoreTasks => "bwtm",
            Self::Bye => "bye",
            Self::Report => "report",
            Self::ReportNoResponse => "report_noresponse",
            Self::ReportBadAuth => "report_bad_auth",
            Self::BadCommand => "bad_command",
            Self::NoTask => "no_task",
            Self::Help => "help",
            Self::IgnoreOk => "ignore_ok",
            Self::IgnoreFailed => "ignore_failed",
            Self::BlacklistAdded => "blacklist_added",
            Self::BlacklistRemoved => "blacklist_removed",
            Self::TestAlert => "test_alert",
        }
    }

    /// Look up a key by its configuration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    fn default_template(self) -> &'static str {
        match self {
            Self::Greeting => "Hi there {name}!",
            Self::Alert => {
                "Securitybot noticed some activity on your account that we'd like you to confirm:\n\
                 *{description}*\n{reason}"
            }
            Self::ActionPrompt => {
                "Did you perform this action? Reply `yes` or `no`, followed by an optional comment."
            }
            Self::No2fa => {
                "Thanks! You don't have a 2FA device we can push to, so we'll take your word for it."
            }
            Self::TwoFa => {
                "Thanks! To be sure it was really you, may I send a 2FA push to your phone? \
                 Reply `yes` or `no`."
            }
            Self::SendingPush => "Sending a push now. Please approve it on your device.",
            Self::GoodAuth => "Authentication succeeded. Thanks for confirming!",
            Self::BadAuth => {
                "That push was not approved. The security team has been notified and may follow up."
            }
            Self::Escalated => {
                "Thanks for letting us know. The security team has been notified and will follow up."
            }
            Self::NoResponse => {
                "I haven't heard back from you, so this alert has been passed to the security team."
            }
            Self::MoreTasks => "I have another alert for you to look at.",
            Self::Bye => "That's everything for now. Thanks for your help!",
            Self::Report => {
                "*{username}* needs follow-up on *{title}*\n{description}\n{comment}\n{url}"
            }
            Self::ReportNoResponse => {
                "*{username}* did not respond to *{title}*\n{description}\n{url}"
            }
            Self::ReportBadAuth => {
                "*{username}* confirmed *{title}* but did not pass 2FA\n{description}\n{url}"
            }
            Self::BadCommand => "Sorry, I didn't understand that. Say `help` to see what I can do.",
            Self::NoTask => "You don't have any alerts waiting for an answer right now.",
            Self::Help => {
                "Here's what I understand:\n\
                 `yes [comment]` / `no [comment]`: answer the current alert\n\
                 `ignore <hours> [reason]`: stop alerting you about this kind of alert for a while\n\
                 `add_to_blacklist` / `remove_from_blacklist`: opt out of or back into alerts\n\
                 `test`: send yourself a test alert\n\
                 `help`: show this message"
            }
            Self::IgnoreOk => "Okay, I'll ignore *{title}* for {hours} hours.",
            Self::IgnoreFailed => {
                "Usage: `ignore <hours> [reason]` while you have an alert in front of you."
            }
            Self::BlacklistAdded => {
                "You won't be contacted about alerts anymore. Say `remove_from_blacklist` to undo."
            }
            Self::BlacklistRemoved => "You'll be contacted about your alerts again.",
            Self::TestAlert => "Creating a test alert. You should hear from me shortly.",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved template table.
#[derive(Debug, Clone)]
pub struct Messages {
    templates: HashMap<MessageKey, String>,
}

impl Default for Messages {
    fn default() -> Self {
        let templates = MessageKey::ALL
            .into_iter()
            .map(|key| (key, key.default_template().to_owned()))
            .collect();
        Self { templates }
    }
}

impl Messages {
    /// Defaults with `overrides` applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override names an unknown key.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self> {
        let mut messages = Self::default();
        for (name, template) in overrides {
            let key = MessageKey::from_name(name)
                .ok_or_else(|| AppError::Config(format!("unknown message key '{name}'")))?;
            messages.templates.insert(key, template.clone());
        }
        Ok(messages)
    }

    /// Raw template for `key`.
    #[must_use]
    pub fn get(&self, key: MessageKey) -> &str {
        self.templates
            .get(&key)
            .map_or_else(|| key.default_template(), String::as_str)
    }

    /// Template for `key` with each `{name}` in `vars` substituted.
    /// Placeholders without a value are left as written, and substituted
    /// values are never scanned for further placeholders.
    #[must_use]
    pub fn render(&self, key: MessageKey, vars: &[(&str, &str)]) -> String {
        let template = self.get(key);
        let mut text = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            text.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let name = &after[..close];
                vars.iter()
                    .find(|(var, _)| *var == name)
                    .map(|(_, value)| (*value, close))
            });
            match value {
                Some((value, close)) => {
                    text.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    text.push('{');
                    rest = after;
                }
            }
        }
        text.push_str(rest);
        text
    }
}

/// Prefix every line of `text` with a chat quote marker.
#[must_use]
pub fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
