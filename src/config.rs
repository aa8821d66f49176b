//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::warn;

use crate::time_budget::BusinessCalendar;
use crate::{AppError, Result};

const KEYRING_SERVICE: &str = "securitybot";

/// One week.
const MAX_ESCALATION_MINUTES: u64 = 10_080;
/// One year.
const MAX_BACKOFF_HOURS: u64 = 8_760;
/// One week.
const MAX_REAUTH_SECONDS: u64 = 604_800;
/// One day.
const MAX_TASK_POLL_SECONDS: u64 = 86_400;
/// One minute.
const MAX_TICK_MILLIS: u64 = 60_000;

/// Slack connectivity settings.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Channel that receives escalation reports. Reports are skipped when unset.
    #[serde(default)]
    pub reporting_channel: Option<String>,
    /// Display name used when posting.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    /// Avatar used when posting.
    #[serde(default)]
    pub icon_url: Option<String>,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

fn default_bot_username() -> String {
    "securitybot".into()
}

/// Dispatcher cadence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimerConfig {
    /// Interval between dispatcher ticks.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Interval between polls of the task store for new alerts.
    #[serde(default = "default_task_poll_seconds")]
    pub task_poll_seconds: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            task_poll_seconds: default_task_poll_seconds(),
        }
    }
}

fn default_tick_millis() -> u64 {
    100
}

fn default_task_poll_seconds() -> u64 {
    30
}

/// Local working hours used to stretch escalation timers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BusinessHoursConfig {
    /// First business hour of the day (inclusive).
    #[serde(default = "default_opening_hour")]
    pub opening_hour: u32,
    /// Hour at which business ends (exclusive).
    #[serde(default = "default_closing_hour")]
    pub closing_hour: u32,
    /// IANA time zone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            opening_hour: default_opening_hour(),
            closing_hour: default_closing_hour(),
            timezone: default_timezone(),
        }
    }
}

fn default_opening_hour() -> u32 {
    10
}

fn default_closing_hour() -> u32 {
    18
}

fn default_timezone() -> String {
    "America/Los_Angeles".into()
}

/// Escalation, backoff and reauthentication windows.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EscalationConfig {
    /// Time a user has to answer before silent escalation.
    #[serde(default = "default_escalation_minutes")]
    pub escalation_minutes: u64,
    /// How long a confirmed alert title stays suppressed for its owner.
    #[serde(default = "default_backoff_hours")]
    pub backoff_hours: u64,
    /// How long a successful 2FA push satisfies later confirmations.
    #[serde(default = "default_reauth_seconds")]
    pub reauth_seconds: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            escalation_minutes: default_escalation_minutes(),
            backoff_hours: default_backoff_hours(),
            reauth_seconds: default_reauth_seconds(),
        }
    }
}

fn default_escalation_minutes() -> u64 {
    120
}

fn default_backoff_hours() -> u64 {
    21
}

fn default_reauth_seconds() -> u64 {
    7200
}

/// Supported MFA back ends.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthProviderKind {
    /// No second factor; every confirmation finishes without a push.
    #[default]
    Null,
    /// Okta Verify push.
    Okta,
    /// Duo Push via the Duo Auth API.
    Duo,
}

/// Okta connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OktaConfig {
    /// Okta org host, e.g. `example.okta.com`.
    pub endpoint: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// API token (populated at runtime).
    #[serde(skip)]
    pub api_token: String,
}

fn default_request_timeout_seconds() -> u64 {
    10
}

/// Duo Auth API settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DuoConfig {
    /// Auth API host, e.g. `api-xxxxxxxx.duosecurity.com`.
    pub api_host: String,
    /// Integration key of the Auth API application.
    pub integration_key: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Secret key used to sign requests (populated at runtime).
    #[serde(skip)]
    pub secret_key: String,
}

/// MFA provider selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AuthConfig {
    /// Which provider to build.
    #[serde(default)]
    pub provider: AuthProviderKind,
    /// Okta settings; required when `provider = "okta"`.
    #[serde(default)]
    pub okta: Option<OktaConfig>,
    /// Duo settings; required when `provider = "duo"`.
    #[serde(default)]
    pub duo: Option<DuoConfig>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Directory for JSONL audit records; auditing is off when unset.
    #[serde(default)]
    pub audit_log_dir: Option<PathBuf>,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Dispatcher cadence.
    #[serde(default)]
    pub timers: TimerConfig,
    /// Business hours calendar.
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,
    /// Escalation and backoff windows.
    #[serde(default)]
    pub escalation: EscalationConfig,
    /// MFA provider.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Message template overrides keyed by template name.
    #[serde(default)]
    pub messages: HashMap<String, String>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack (and, when needed, MFA provider) credentials from the OS
    /// keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// a required credential.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        if let Some(okta) = self.auth.okta.as_mut() {
            if self.auth.provider == AuthProviderKind::Okta {
                okta.api_token = load_credential("okta_api_token", "OKTA_API_TOKEN").await?;
            }
        }
        if let Some(duo) = self.auth.duo.as_mut() {
            if self.auth.provider == AuthProviderKind::Duo {
                duo.secret_key = load_credential("duo_secret_key", "DUO_SECRET_KEY").await?;
            }
        }
        Ok(())
    }

    /// Business hours calendar built from the `[business_hours]` table.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the time zone is unknown.
    pub fn calendar(&self) -> Result<BusinessCalendar> {
        let tz: Tz = self.business_hours.timezone.parse().map_err(|_| {
            AppError::Config(format!(
                "unknown timezone '{}'",
                self.business_hours.timezone
            ))
        })?;
        Ok(BusinessCalendar::new(
            self.business_hours.opening_hour,
            self.business_hours.closing_hour,
            tz,
        ))
    }

    /// Time a user has to respond before auto-escalation.
    #[must_use]
    pub fn escalation_window(&self) -> Duration {
        let minutes = self.escalation.escalation_minutes.min(MAX_ESCALATION_MINUTES);
        Duration::minutes(clamp_i64(minutes))
    }

    /// Suppression window after a confirmed alert.
    #[must_use]
    pub fn backoff_window(&self) -> Duration {
        let hours = self.escalation.backoff_hours.min(MAX_BACKOFF_HOURS);
        Duration::hours(clamp_i64(hours))
    }

    /// How long a successful push keeps satisfying confirmations.
    #[must_use]
    pub fn reauth_window(&self) -> Duration {
        let seconds = self.escalation.reauth_seconds.min(MAX_REAUTH_SECONDS);
        Duration::seconds(clamp_i64(seconds))
    }

    /// Interval between task store polls.
    #[must_use]
    pub fn task_poll_interval(&self) -> Duration {
        let seconds = self.timers.task_poll_seconds.min(MAX_TASK_POLL_SECONDS);
        Duration::seconds(clamp_i64(seconds))
    }

    /// Interval between dispatcher ticks.
    #[must_use]
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timers.tick_millis.min(MAX_TICK_MILLIS))
    }

    fn validate(&self) -> Result<()> {
        let hours = &self.business_hours;
        if hours.opening_hour >= hours.closing_hour || hours.closing_hour > 24 {
            return Err(AppError::Config(format!(
                "business hours must satisfy opening_hour < closing_hour <= 24 (got {}..{})",
                hours.opening_hour, hours.closing_hour
            )));
        }
        self.calendar()?;

        check_range("tick_millis", self.timers.tick_millis, 1, MAX_TICK_MILLIS)?;
        check_range(
            "task_poll_seconds",
            self.timers.task_poll_seconds,
            1,
            MAX_TASK_POLL_SECONDS,
        )?;

        let escalation = &self.escalation;
        check_range(
            "escalation_minutes",
            escalation.escalation_minutes,
            0,
            MAX_ESCALATION_MINUTES,
        )?;
        check_range("backoff_hours", escalation.backoff_hours, 0, MAX_BACKOFF_HOURS)?;
        check_range(
            "reauth_seconds",
            escalation.reauth_seconds,
            0,
            MAX_REAUTH_SECONDS,
        )?;

        if self.auth.provider == AuthProviderKind::Okta && self.auth.okta.is_none() {
            return Err(AppError::Config(
                "auth.provider = \"okta\" requires an [auth.okta] table".into(),
            ));
        }
        if self.auth.provider == AuthProviderKind::Duo && self.auth.duo.is_none() {
            return Err(AppError::Config(
                "auth.provider = \"duo\" requires an [auth.duo] table".into(),
            ));
        }

        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{name} must be between {min} and {max} (got {value})"
        )))
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
