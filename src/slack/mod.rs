//! Slack transport: Socket Mode for inbound direct messages and a
//! buffered `chat.postMessage` queue for outbound text.

pub mod client;
pub mod events;

pub use client::{SlackChat, SlackRuntime};
