#![forbid(unsafe_code)]

//! Security alert verification bot.
//!
//! Tasks produced by an alerting source are routed to the person who
//! triggered them. Each person is walked through a small state machine
//! over chat ("did you do this?", "may we send you a 2FA push?") and the
//! outcome is either a confirmed, backed-off alert or an escalation to the
//! security team's reporting channel.

pub mod audit;
pub mod auth;
pub mod chat;
pub mod config;
pub mod engine;
pub mod errors;
pub mod messages;
pub mod models;
pub mod persistence;
pub mod slack;
pub mod tasker;
pub mod time_budget;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;
