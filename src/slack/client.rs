//! Slack implementation of [`ChatClient`].
//!
//! Outbound text goes through a bounded queue drained by a worker task
//! that retries rate-limited posts. Enqueueing never waits for room. Inbound direct messages arrive via
//! Socket Mode and are buffered until the dispatcher drains them.

use std::sync::Arc;
use std::time::Duration;

use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiToken, SlackApiTokenType, SlackApiTokenValue,
    SlackApiUsersListRequest, SlackChannelId, SlackClient, SlackClientEventsListenerEnvironment,
    SlackClientHyperHttpsConnector, SlackClientSocketModeConfig, SlackClientSocketModeListener,
    SlackMessageContent, SlackSocketModeListenerCallbacks, SlackUser,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatClient, ChatEvent};
use crate::config::SlackConfig;
use crate::models::user::ChatUser;
use crate::slack::events::{self, InboundState};
use crate::{AppError, BoxFuture, Result};

const QUEUE_CAPACITY: usize = 256;
const INBOX_CAPACITY: usize = 1024;
const USERS_PAGE_LIMIT: u16 = 200;
const MAX_SEND_ATTEMPTS: u32 = 5;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

type Client = SlackClient<SlackClientHyperHttpsConnector>;

/// One queued `chat.postMessage`.
#[derive(Debug, Clone)]
struct Outbound {
    channel: SlackChannelId,
    text: String,
}

/// Background tasks owned by [`SlackChat`].
pub struct SlackRuntime {
    /// Outbound queue worker.
    pub queue_task: JoinHandle<()>,
    /// Socket Mode listener.
    pub socket_task: JoinHandle<()>,
}

impl SlackRuntime {
    /// Stop both background tasks.
    pub fn abort(&self) {
        self.queue_task.abort();
        self.socket_task.abort();
    }
}

/// Slack-backed chat transport.
pub struct SlackChat {
    client: Arc<Client>,
    bot_token: SlackApiToken,
    queue_tx: mpsc::Sender<Outbound>,
    inbox: Mutex<mpsc::Receiver<ChatEvent>>,
}

fn token(value: &str, token_type: SlackApiTokenType) -> SlackApiToken {
    SlackApiToken {
        token_value: SlackApiTokenValue(value.to_owned()),
        cookie: None,
        team_id: None,
        scope: None,
        token_type: Some(token_type),
    }
}

impl SlackChat {
    /// Connect Socket Mode and start the outbound worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the HTTPS connector cannot be created.
    pub fn start(config: &SlackConfig) -> Result<(Self, SlackRuntime)> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Chat(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = token(&config.bot_token, SlackApiTokenType::Bot);
        let app_token = token(&config.app_token, SlackApiTokenType::App);

        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

        let queue_task = spawn_sender(
            Arc::clone(&client),
            bot_token.clone(),
            config.bot_username.clone(),
            config.icon_url.clone(),
            queue_rx,
        );
        let socket_task = spawn_socket_mode(&client, app_token, InboundState { tx: inbox_tx });
        info!("slack transport started");

        Ok((
            Self {
                client,
                bot_token,
                queue_tx,
                inbox: Mutex::new(inbox_rx),
            },
            SlackRuntime {
                queue_task,
                socket_task,
            },
        ))
    }

    fn enqueue(&self, channel: &str, text: &str) -> Result<()> {
        let message = Outbound {
            channel: SlackChannelId(channel.to_owned()),
            text: text.to_owned(),
        };
        try_enqueue(&self.queue_tx, message)
    }

    async fn fetch_users(&self) -> Result<Vec<ChatUser>> {
        let session = self.client.open_session(&self.bot_token);
        let mut users = Vec::new();
        let mut cursor = None;
        loop {
            let request = SlackApiUsersListRequest::new()
                .with_limit(USERS_PAGE_LIMIT)
                .opt_cursor(cursor.take());
            let response = session
                .users_list(&request)
                .await
                .map_err(|err| AppError::Chat(format!("users.list failed: {err}")))?;

            users.extend(response.members.iter().filter_map(to_chat_user));

            cursor = response
                .response_metadata
                .and_then(|meta| meta.next_cursor)
                .filter(|next| !next.0.is_empty());
            if cursor.is_none() {
                break;
            }
        }
        debug!(count = users.len(), "fetched slack users");
        Ok(users)
    }
}

fn to_chat_user(member: &SlackUser) -> Option<ChatUser> {
    if member.deleted == Some(true) {
        return None;
    }
    let name = member.name.clone()?;
    let profile = member.profile.as_ref();
    let display_name = profile
        .and_then(|p| p.display_name.clone().or_else(|| p.real_name.clone()))
        .filter(|name| !name.is_empty());
    let email = profile
        .and_then(|p| p.email.as_ref())
        .map(|email| email.0.clone());
    Some(ChatUser {
        id: member.id.to_string(),
        name,
        display_name,
        email,
    })
}

impl ChatClient for SlackChat {
    fn list_directory(&self) -> BoxFuture<'_, Vec<ChatUser>> {
        Box::pin(self.fetch_users())
    }

    fn receive_events(&self) -> BoxFuture<'_, Vec<ChatEvent>> {
        Box::pin(async move {
            let mut inbox = self.inbox.lock().await;
            let mut events = Vec::new();
            loop {
                match inbox.try_recv() {
                    Ok(event) => events.push(event),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        if events.is_empty() {
                            return Err(AppError::Chat("socket mode listener stopped".into()));
                        }
                        break;
                    }
                }
            }
            Ok(events)
        })
    }

    fn send_direct<'a>(&'a self, user: &'a ChatUser, text: &'a str) -> BoxFuture<'a, ()> {
        // Posting to a user id opens (or reuses) the bot's DM with them.
        Box::pin(async move { self.enqueue(&user.id, text) })
    }

    fn send_channel<'a>(&'a self, channel: &'a str, text: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.enqueue(channel, text) })
    }
}

/// Queue `message` without waiting. A full or closed queue is a chat error.
fn try_enqueue(queue_tx: &mpsc::Sender<Outbound>, message: Outbound) -> Result<()> {
    match queue_tx.try_send(message) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(message)) => {
            warn!(channel = %message.channel.0, "slack outbound queue full, dropping message");
            Err(AppError::Chat("slack outbound queue is full".into()))
        }
        Err(TrySendError::Closed(_)) => {
            Err(AppError::Chat("slack outbound queue is closed".into()))
        }
    }
}

fn post_request(
    message: &Outbound,
    username: &str,
    icon_url: Option<&String>,
) -> SlackApiChatPostMessageRequest {
    let content = SlackMessageContent {
        text: Some(message.text.clone()),
        markdown_text: None,
        blocks: None,
        attachments: None,
        upload: None,
        files: None,
        reactions: None,
        metadata: None,
    };

    SlackApiChatPostMessageRequest {
        channel: message.channel.clone(),
        content,
        as_user: None,
        icon_emoji: None,
        icon_url: icon_url.cloned(),
        link_names: Some(true),
        parse: None,
        thread_ts: None,
        username: Some(username.to_owned()),
        reply_broadcast: None,
        unfurl_links: None,
        unfurl_media: None,
    }
}

fn spawn_sender(
    client: Arc<Client>,
    token: SlackApiToken,
    username: String,
    icon_url: Option<String>,
    mut queue_rx: mpsc::Receiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let session = client.open_session(&token);
        while let Some(message) = queue_rx.recv().await {
            let request = post_request(&message, &username, icon_url.as_ref());
            let mut backoff = INITIAL_RETRY_DELAY;
            for attempt in 1..=MAX_SEND_ATTEMPTS {
                match session.chat_post_message(&request).await {
                    Ok(_) => {
                        debug!(channel = %message.channel, "sent slack message");
                        break;
                    }
                    Err(error) if attempt == MAX_SEND_ATTEMPTS => {
                        error!(?error, channel = %message.channel, "giving up on slack message");
                    }
                    Err(error) => {
                        let delay = match &error {
                            slack_morphism::errors::SlackClientError::RateLimitError(rate) => {
                                rate.retry_after.unwrap_or(backoff)
                            }
                            _ => backoff,
                        };
                        warn!(?error, ?delay, attempt, "slack post failed; retrying");
                        sleep(delay).await;
                        backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                    }
                }
            }
        }
        info!("slack sender task exiting");
    })
}

fn spawn_socket_mode(
    client: &Arc<Client>,
    app_token: SlackApiToken,
    inbound: InboundState,
) -> JoinHandle<()> {
    let listener_env = Arc::new(
        SlackClientEventsListenerEnvironment::new(Arc::clone(client))
            .with_error_handler(|err, _client, _state| {
                error!(?err, "socket mode error");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            })
            .with_user_state(inbound),
    );
    let callbacks = SlackSocketModeListenerCallbacks::new()
        .with_hello_events(|event, _client, _state| async move {
            info!(?event, "socket hello");
        })
        .with_push_events(events::handle_push_event);
    let config = SlackClientSocketModeConfig {
        max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
        debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
        initial_backoff_in_seconds: SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
        reconnect_timeout_in_seconds:
            SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
        ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
        ping_failure_threshold_times:
            SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
    };

    let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
    tokio::spawn(async move {
        if let Err(error) = listener.listen_for(&app_token).await {
            error!(?error, "socket mode listen failed");
            return;
        }
        listener.serve().await;
        info!("socket mode listener exited");
    })
}
