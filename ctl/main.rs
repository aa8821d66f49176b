#![forbid(unsafe_code)]

//! Operator CLI for the `securitybot` database.
//!
//! Works directly on the `SQLite` file the service reads, so it can be used
//! while the service is running: new alerts are picked up on the next poll.
//! Blacklist changes made here take effect at the next service restart.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use securitybot::config::GlobalConfig;
use securitybot::models::task::{NewAlert, TaskStatus};
use securitybot::persistence::blacklist::Blacklist;
use securitybot::persistence::db;
use securitybot::persistence::ignore_list::IgnoreList;
use securitybot::persistence::task_repo::SqlTaskStore;
use securitybot::tasker::TaskStore;
use securitybot::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "securitybot-ctl",
    about = "Operator CLI for the securitybot task database",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the service's TOML configuration; supplies `database_path`.
    #[arg(long, conflicts_with = "database")]
    config: Option<PathBuf>,

    /// Path to the `SQLite` database, used instead of `--config`.
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum StatusArg {
    Open,
    InProgress,
    Verification,
}

impl From<StatusArg> for TaskStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Open => Self::Open,
            StatusArg::InProgress => Self::InProgress,
            StatusArg::Verification => Self::Verification,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new open alert.
    NewAlert {
        /// Alert title; also the ignore-list key.
        #[arg(long)]
        title: String,
        /// Chat username of the person who triggered the alert.
        #[arg(long)]
        user: String,
        /// Human-readable description shown to the user.
        #[arg(long)]
        description: String,
        /// Why the alert fired.
        #[arg(long)]
        reason: String,
        /// Link with more detail.
        #[arg(long)]
        url: Option<String>,
        /// Explicit storage key instead of a content hash.
        #[arg(long)]
        key: Option<String>,
    },

    /// List tasks at a status.
    Tasks {
        /// Status to list.
        #[arg(long, value_enum, default_value_t = StatusArg::Verification)]
        status: StatusArg,
    },

    /// Count tasks per status.
    Counts,

    /// Manage the blacklist.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },

    /// Inspect or clear ignore-list entries.
    Ignored {
        #[command(subcommand)]
        action: IgnoredAction,
    },
}

#[derive(Debug, Subcommand)]
enum BlacklistAction {
    /// Add a username.
    Add {
        /// Chat username.
        name: String,
    },
    /// Remove a username.
    Remove {
        /// Chat username.
        name: String,
    },
    /// Print every blacklisted username.
    List,
}

#[derive(Debug, Subcommand)]
enum IgnoredAction {
    /// Print live entries, soonest expiry first.
    List,
    /// Remove one entry.
    Remove {
        /// Chat username.
        user: String,
        /// Alert title.
        title: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn database_path(args: &Cli) -> Result<PathBuf> {
    match (&args.database, &args.config) {
        (Some(path), _) => Ok(path.clone()),
        (None, Some(config)) => Ok(GlobalConfig::load_from_path(config)?.database_path),
        (None, None) => Err(AppError::Config(
            "either --config or --database is required".into(),
        )),
    }
}

async fn run(args: Cli) -> Result<()> {
    let path = database_path(&args)?;
    let pool = Arc::new(db::connect(&path).await?);
    let now = Utc::now();

    match args.command {
        Command::NewAlert {
            title,
            user,
            description,
            reason,
            url,
            key,
        } => {
            let mut alert = NewAlert::new(title, user, description, reason, url);
            alert.key = key;
            let task = SqlTaskStore::new(pool).create(alert).await?;
            println!("{}", task.hash);
        }
        Command::Tasks { status } => {
            let tasks = SqlTaskStore::new(pool)
                .tasks_with_status(status.into())
                .await?;
            print_json(&tasks)?;
        }
        Command::Counts => {
            for (status, count) in SqlTaskStore::new(pool).count_by_status().await? {
                println!("{:<14}{count}", status.as_str());
            }
        }
        Command::Blacklist { action } => {
            let mut blacklist = Blacklist::load(pool).await?;
            match action {
                BlacklistAction::Add { name } => {
                    report_change(blacklist.add(&name).await?, "added", &name);
                }
                BlacklistAction::Remove { name } => {
                    report_change(blacklist.remove(&name).await?, "removed", &name);
                }
                BlacklistAction::List => {
                    for name in blacklist.names() {
                        println!("{name}");
                    }
                }
            }
        }
        Command::Ignored { action } => {
            let ignore_list = IgnoreList::new(pool);
            match action {
                IgnoredAction::List => {
                    for entry in ignore_list.list(now).await? {
                        println!(
                            "{}\t{}\t{}\t{}",
                            entry.username,
                            entry.title,
                            format_until(entry.until),
                            entry.reason
                        );
                    }
                }
                IgnoredAction::Remove { user, title } => {
                    if !ignore_list.remove(&user, &title).await? {
                        return Err(AppError::NotFound(format!(
                            "no ignore entry for {user} / {title}"
                        )));
                    }
                    println!("OK");
                }
            }
        }
    }
    Ok(())
}

fn report_change(changed: bool, verb: &str, name: &str) {
    if changed {
        println!("{verb} {name}");
    } else {
        println!("{name} unchanged");
    }
}

fn format_until(until: DateTime<Utc>) -> String {
    until.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to encode output: {err}")))?;
    println!("{text}");
    Ok(())
}
