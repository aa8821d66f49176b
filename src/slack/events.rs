//! Socket Mode push-event handling.
//!
//! Only plain direct messages from people are forwarded to the engine.
//! Bot messages, edits, and anything posted outside a DM channel are
//! dropped here.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackMessageEvent, SlackPushEventCallback,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::chat::ChatEvent;

/// State injected into the Socket Mode listener.
#[derive(Clone)]
pub struct InboundState {
    /// Destination for accepted direct messages.
    pub tx: mpsc::Sender<ChatEvent>,
}

/// Whether `channel` is a direct-message channel id.
#[must_use]
pub fn is_direct_channel(channel: &str) -> bool {
    channel.starts_with('D')
}

/// Convert a message event into a [`ChatEvent`] if it is a user's DM.
#[must_use]
pub fn direct_message(event: &SlackMessageEvent) -> Option<ChatEvent> {
    if event.subtype.is_some() || event.sender.bot_id.is_some() {
        return None;
    }
    let channel = event.origin.channel.as_ref()?;
    if !is_direct_channel(&channel.to_string()) {
        return None;
    }
    let user_id = event.sender.user.as_ref()?.to_string();
    let text = event.content.as_ref()?.text.clone()?;
    Some(ChatEvent { user_id, text })
}

/// Push-event callback registered with the Socket Mode listener.
///
/// # Errors
///
/// Never fails; delivery problems are logged.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackEventCallbackBody::Message(ref message) = event.event else {
        debug!("non-message push event ignored");
        return Ok(());
    };
    let Some(inbound) = direct_message(message) else {
        return Ok(());
    };

    let inbound_state: Option<InboundState> = {
        let guard = state.read().await;
        guard.get_user_state::<InboundState>().cloned()
    };
    let Some(inbound_state) = inbound_state else {
        warn!("inbound state missing; dropping direct message");
        return Ok(());
    };

    if let Err(err) = inbound_state.tx.send(inbound).await {
        warn!(%err, "engine inbox closed; dropping direct message");
    }
    Ok(())
}
