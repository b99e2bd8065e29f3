//! Telegram channel adapter using the Bot API.
//!
//! Inbound messages arrive through a `getUpdates` long-poll loop started by
//! `connect`. Sessions are Telegram chats: the session key carries the bot ID
//! (the numeric prefix of the token) as account and the chat ID as peer.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::Instrument;

use switchboard_core::config::TelegramConfig;
use switchboard_core::logging::Logger;
use switchboard_core::secrets::{ApiKey, COMMON_SECRET_PATTERNS, scrub_secrets};
use switchboard_core::types::{
    Attachment, AttachmentKind, ChannelId, DeliveryResult, InboundMessage, OutboundMessage, PeerId,
    PeerType, SessionKey,
};
use switchboard_core::validation::{
    limits, telegram_bot_id, validate_message_content, validate_raw_payload,
};

use crate::inbox::Inbox;
use crate::traits::{
    Channel, ChannelCapabilities, ChannelError, ChannelProbe, ChannelState, MessageHandler,
};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram message limit, in characters.
const TEXT_CHUNK_LIMIT: usize = 4096;

/// Bot API allows roughly 30 messages per second per bot.
const SENDS_PER_SECOND: u32 = 30;

/// Pause after a failed `getUpdates` call.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel adapter.
pub struct TelegramChannel {
    api: TelegramApi,
    bot_id: String,
    poll_timeout: Duration,
    state: Arc<RwLock<TelegramState>>,
    connected: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
    inbox: Arc<Inbox>,
    limiter: DefaultDirectRateLimiter,
    logger: Logger,
}

#[derive(Debug, Default)]
struct TelegramState {
    username: Option<String>,
    display_name: Option<String>,
    last_update_id: Option<i64>,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Config` if the token is not of the form
    /// `<bot_id>:<secret>`.
    pub fn new(token: ApiKey) -> Result<Self, ChannelError> {
        let bot_id = bot_id_of(&token)?;
        let logger = Logger::disabled();
        Ok(Self {
            api: TelegramApi {
                client: Client::new(),
                token,
                base: TELEGRAM_API_BASE.to_string(),
            },
            bot_id,
            poll_timeout: Duration::from_secs(30),
            state: Arc::new(RwLock::new(TelegramState::default())),
            connected: AtomicBool::new(false),
            poller: Mutex::new(None),
            inbox: Arc::new(Inbox::new(logger.clone())),
            limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(SENDS_PER_SECOND).unwrap_or(NonZeroU32::MIN),
            )),
            logger,
        })
    }

    /// Create a Telegram channel from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Config` if the token is missing or malformed.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ChannelError> {
        let token = config
            .bot_token
            .clone()
            .ok_or_else(|| ChannelError::Config("Telegram bot token is not set".to_string()))?;

        let mut channel = Self::new(ApiKey::new(token))?
            .with_poll_timeout(Duration::from_secs(config.poll_timeout_secs));
        if let Some(base) = &config.api_base {
            channel = channel.with_api_base(base.clone());
        }
        Ok(channel)
    }

    /// Override the Bot API base URL.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api.base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Long-poll timeout for `getUpdates`.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Attach a logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.inbox.set_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// Bot ID used as account in session keys.
    #[must_use]
    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Map a session key back to the chat it addresses.
    fn chat_of(&self, session_key: &SessionKey) -> Result<String, ChannelError> {
        session_key
            .parts()
            .filter(|p| p.channel == ChannelId::telegram() && p.account_id == self.bot_id)
            .map(|p| p.peer_id.0)
            .ok_or_else(|| ChannelError::UnknownSession(session_key.clone()))
    }

    fn stop_poller(&self) {
        let handle = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    async fn send_text(&self, chat_id: &str, content: &OutboundMessage) -> Result<i64, ChannelError> {
        let mut last_id = None;

        for chunk in chunk_text(&content.text, TEXT_CHUNK_LIMIT) {
            let params = SendMessageParams {
                chat_id: chat_id.to_string(),
                text: chunk.to_string(),
                // Only the first chunk is the reply
                reply_to_message_id: if last_id.is_none() {
                    content.reply_to.as_ref().and_then(|id| id.parse().ok())
                } else {
                    None
                },
                message_thread_id: content.thread_id.as_ref().and_then(|id| id.parse().ok()),
            };

            self.limiter.until_ready().await;
            let sent: TelegramMessage = self.api.call("sendMessage", Some(&params)).await?;
            last_id = Some(sent.message_id);
        }

        last_id.ok_or_else(|| ChannelError::Rejected("message is empty".to_string()))
    }

    async fn send_media(
        &self,
        chat_id: &str,
        content: &OutboundMessage,
        attachment: &Attachment,
    ) -> Result<i64, ChannelError> {
        let (method, field) = media_method(attachment.kind);
        let mut params = serde_json::Map::new();
        params.insert("chat_id".to_string(), chat_id.into());
        params.insert(field.to_string(), attachment.url.clone().into());
        if let Some(thread_id) = content.thread_id.as_ref().and_then(|id| id.parse::<i64>().ok()) {
            params.insert("message_thread_id".to_string(), thread_id.into());
        }

        self.limiter.until_ready().await;
        let sent: TelegramMessage = self.api.call(method, Some(&params)).await?;
        Ok(sent.message_id)
    }
}

/// HTTP side of the Bot API.
#[derive(Clone)]
struct TelegramApi {
    client: Client,
    token: ApiKey,
    base: String,
}

impl TelegramApi {
    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token.expose(), method)
    }

    /// Strip the token from anything that may have echoed the request URL.
    fn scrub(&self, text: &str) -> String {
        scrub_secrets(&self.token.redact(text), COMMON_SECRET_PATTERNS)
    }

    /// Call a Bot API method.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Option<&impl Serialize>,
    ) -> Result<T, ChannelError> {
        let url = self.url(method);

        let response = match params {
            Some(p) => self.client.post(&url).json(p).send().await,
            None => self.client.get(&url).send().await,
        }
        .map_err(|e| ChannelError::Network(self.scrub(&e.to_string())))?;

        let status = response.status();
        let body: Option<TelegramResponse<T>> = response.json().await.ok();

        match body {
            Some(TelegramResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Some(TelegramResponse { description, .. }) => Err(api_error(
                status.as_u16(),
                &self.scrub(&description.unwrap_or_else(|| "Unknown error".to_string())),
            )),
            None => Err(api_error(status.as_u16(), "unreadable response")),
        }
    }
}

fn api_error(status: u16, description: &str) -> ChannelError {
    match status {
        429 => ChannelError::RateLimited,
        401 | 404 => ChannelError::AuthFailed(description.to_string()),
        400 | 403 => ChannelError::Rejected(description.to_string()),
        _ => ChannelError::Network(format!("{status}: {description}")),
    }
}

/// Telegram reports a missing or inaccessible chat as a 400.
fn unknown_chat(err: ChannelError, session_key: &SessionKey) -> ChannelError {
    match err {
        ChannelError::Rejected(desc) if desc.contains("chat not found") => {
            ChannelError::UnknownSession(session_key.clone())
        }
        other => other,
    }
}

fn bot_id_of(token: &ApiKey) -> Result<String, ChannelError> {
    telegram_bot_id(token.expose())
        .map(str::to_string)
        .ok_or_else(|| {
            ChannelError::Config("Telegram bot token must have the form <bot_id>:<secret>".into())
        })
}

const fn media_method(kind: AttachmentKind) -> (&'static str, &'static str) {
    match kind {
        AttachmentKind::Image => ("sendPhoto", "photo"),
        AttachmentKind::Video => ("sendVideo", "video"),
        AttachmentKind::Audio => ("sendAudio", "audio"),
        AttachmentKind::Voice => ("sendVoice", "voice"),
        AttachmentKind::Document | AttachmentKind::Unknown => ("sendDocument", "document"),
    }
}

/// Split text into pieces of at most `limit` characters.
fn chunk_text(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }

    chunks
}

fn peer_type_of(chat: &TelegramChat) -> PeerType {
    match chat.chat_type.as_str() {
        "group" | "supergroup" => PeerType::Group,
        "channel" => PeerType::Channel,
        _ => PeerType::Dm,
    }
}

fn session_for(bot_id: &str, chat: &TelegramChat) -> SessionKey {
    SessionKey::build(
        &ChannelId::telegram(),
        bot_id,
        peer_type_of(chat),
        &PeerId::new(chat.id.to_string()),
    )
}

/// Turn an update into an inbound message.
fn normalize(bot_id: &str, update: TelegramUpdate) -> Result<InboundMessage, ChannelError> {
    let raw_value = serde_json::to_value(&update).ok();

    let message = update
        .message
        .or(update.edited_message)
        .or(update.channel_post)
        .ok_or_else(|| ChannelError::Format("No message in update".to_string()))?;

    let session_key = session_for(bot_id, &message.chat);
    let peer_type = peer_type_of(&message.chat);
    let peer_id = message
        .from
        .as_ref()
        .map_or_else(|| message.chat.id.to_string(), |from| from.id.to_string());

    let mut attachments = Vec::new();

    if let Some(largest) = message.photo.as_ref().and_then(|photos| photos.last()) {
        attachments.push(Attachment {
            kind: AttachmentKind::Image,
            url: largest.file_id.clone(),
            mime_type: Some("image/jpeg".to_string()),
            filename: None,
            size: largest.file_size.and_then(|s| u64::try_from(s).ok()),
        });
    }

    if let Some(doc) = message.document {
        attachments.push(Attachment {
            kind: AttachmentKind::Document,
            url: doc.file_id,
            mime_type: doc.mime_type,
            filename: doc.file_name,
            size: doc.file_size.and_then(|s| u64::try_from(s).ok()),
        });
    }

    if let Some(voice) = message.voice {
        attachments.push(Attachment {
            kind: AttachmentKind::Voice,
            url: voice.file_id,
            mime_type: Some(voice.mime_type.unwrap_or_else(|| "audio/ogg".to_string())),
            filename: None,
            size: voice.file_size.and_then(|s| u64::try_from(s).ok()),
        });
    }

    if let Some(video) = message.video {
        attachments.push(Attachment {
            kind: AttachmentKind::Video,
            url: video.file_id,
            mime_type: video.mime_type,
            filename: None,
            size: video.file_size.and_then(|s| u64::try_from(s).ok()),
        });
    }

    let text = message.text.or(message.caption).unwrap_or_default();
    let content = validate_message_content(&text, limits::MAX_MESSAGE_LENGTH)?;

    Ok(InboundMessage {
        id: message.message_id.to_string(),
        channel: ChannelId::telegram(),
        account_id: bot_id.to_string(),
        session_key,
        peer_id: PeerId::new(peer_id),
        peer_type,
        content,
        attachments,
        timestamp: chrono::DateTime::from_timestamp(message.date, 0)
            .unwrap_or_else(chrono::Utc::now),
        reply_to: message.reply_to_message.map(|m| m.message_id.to_string()),
        thread_id: message.message_thread_id.map(|id| id.to_string()),
        mentions: Vec::new(),
        raw: raw_value,
    })
}

/// Long-poll `getUpdates` and feed the inbox until aborted.
async fn poll_updates(
    api: TelegramApi,
    bot_id: String,
    timeout: Duration,
    state: Arc<RwLock<TelegramState>>,
    inbox: Arc<Inbox>,
    logger: Logger,
) {
    let mut offset = state.read().await.last_update_id.map(|id| id + 1);

    loop {
        let params = GetUpdatesParams {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: vec!["message", "edited_message", "channel_post"],
        };

        match api.call::<Vec<TelegramUpdate>>("getUpdates", Some(&params)).await {
            Ok(updates) => {
                for update in updates {
                    let update_id = update.update_id;
                    offset = Some(update_id + 1);
                    state.write().await.last_update_id = Some(update_id);

                    match normalize(&bot_id, update) {
                        Ok(message) => inbox.push(message),
                        Err(e) => logger
                            .in_scope(|| tracing::warn!(update_id, error = %e, "skipping update")),
                    }
                }
            }
            Err(e) => {
                logger.in_scope(|| tracing::warn!(error = %e, "getUpdates failed"));
                tokio::time::sleep(POLL_ERROR_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn label(&self) -> &str {
        "Telegram"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            text: true,
            images: true,
            voice: true,
            files: true,
            threads: true,
            text_chunk_limit: Some(TEXT_CHUNK_LIMIT),
        }
    }

    fn state(&self) -> ChannelState {
        if self.connected.load(Ordering::SeqCst) {
            ChannelState::Connected
        } else {
            ChannelState::Disconnected
        }
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Verify the token and get bot info
        let me: TelegramUser = self
            .api
            .call("getMe", None::<&()>)
            .await
            .map_err(|e| match e {
                ChannelError::AuthFailed(msg) => ChannelError::AuthFailed(msg),
                other => ChannelError::Connection(other.to_string()),
            })?;

        if me.id.to_string() != self.bot_id {
            return Err(ChannelError::AuthFailed(format!(
                "token belongs to bot {}, expected {}",
                me.id, self.bot_id
            )));
        }

        {
            let mut state = self.state.write().await;
            state.username = me.username;
            state.display_name = Some(me.first_name.clone());
        }

        self.inbox.start();

        {
            let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
            if poller.is_none() {
                let task = poll_updates(
                    self.api.clone(),
                    self.bot_id.clone(),
                    self.poll_timeout,
                    Arc::clone(&self.state),
                    Arc::clone(&self.inbox),
                    self.logger.clone(),
                );
                *poller = Some(tokio::spawn(task.instrument(self.logger.span().clone())));
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        self.logger
            .in_scope(|| tracing::info!(bot = %me.first_name, "Telegram bot connected"));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        self.stop_poller();
        if self.connected.swap(false, Ordering::SeqCst) {
            self.logger.in_scope(|| tracing::info!("Telegram bot disconnected"));
        }
        Ok(())
    }

    fn on_message(&self, handler: Arc<dyn MessageHandler>) {
        self.inbox.set_handler(handler);
    }

    async fn send(
        &self,
        session_key: &SessionKey,
        content: OutboundMessage,
    ) -> Result<DeliveryResult, ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }
        let chat_id = self.chat_of(session_key)?;
        if content.is_empty() {
            return Err(ChannelError::Rejected("message is empty".to_string()));
        }

        let mut last_id = None;
        if !content.text.is_empty() {
            last_id = Some(
                self.send_text(&chat_id, &content)
                    .await
                    .map_err(|e| unknown_chat(e, session_key))?,
            );
        }
        for attachment in &content.attachments {
            last_id = Some(
                self.send_media(&chat_id, &content, attachment)
                    .await
                    .map_err(|e| unknown_chat(e, session_key))?,
            );
        }

        let message_id = last_id
            .ok_or_else(|| ChannelError::Rejected("message is empty".to_string()))?
            .to_string();

        self.logger
            .in_scope(|| tracing::debug!(session = %session_key, %message_id, "message delivered"));

        Ok(DeliveryResult {
            message_id,
            channel: ChannelId::telegram(),
            session_key: session_key.clone(),
            timestamp: chrono::Utc::now(),
            meta: None,
        })
    }

    fn session_key(&self, raw: &serde_json::Value) -> Result<SessionKey, ChannelError> {
        validate_raw_payload(raw)?;
        let update: TelegramUpdate = serde_json::from_value(raw.clone())
            .map_err(|e| ChannelError::Format(e.to_string()))?;

        let message = update
            .message
            .or(update.edited_message)
            .or(update.channel_post)
            .ok_or_else(|| ChannelError::Format("No message in update".to_string()))?;

        Ok(session_for(&self.bot_id, &message.chat))
    }

    async fn probe(&self) -> Result<ChannelProbe, ChannelError> {
        let pending_inbound = self.inbox.pending();
        match self.api.call::<TelegramUser>("getMe", None::<&()>).await {
            Ok(me) => Ok(ChannelProbe {
                connected: self.connected.load(Ordering::SeqCst),
                account_id: Some(me.id.to_string()),
                display_name: Some(me.first_name),
                pending_inbound,
                error: None,
            }),
            Err(e) => Ok(ChannelProbe {
                connected: false,
                account_id: Some(self.bot_id.clone()),
                display_name: self.state.read().await.display_name.clone(),
                pending_inbound,
                error: Some(e.to_string()),
            }),
        }
    }
}

impl Drop for TelegramChannel {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

// Telegram API types

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    /// User ID.
    pub id: i64,
    /// Whether user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: Option<String>,
    /// Username.
    pub username: Option<String>,
}

/// Incoming update from `getUpdates` or a webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    /// Update ID.
    pub update_id: i64,
    /// New message.
    pub message: Option<TelegramMessage>,
    /// Edited message.
    pub edited_message: Option<TelegramMessage>,
    /// Channel post.
    pub channel_post: Option<TelegramMessage>,
}

/// Telegram message.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub date: i64,
    pub chat: TelegramChat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub reply_to_message: Option<Box<TelegramMessage>>,
    pub message_thread_id: Option<i64>,
    pub photo: Option<Vec<TelegramPhotoSize>>,
    pub document: Option<TelegramDocument>,
    pub voice: Option<TelegramVoice>,
    pub video: Option<TelegramVideo>,
}

/// Telegram chat.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: i32,
    pub height: i32,
    pub file_size: Option<i32>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i32>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramVoice {
    pub file_id: String,
    pub file_unique_id: String,
    pub duration: i32,
    pub mime_type: Option<String>,
    pub file_size: Option<i32>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramVideo {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: i32,
    pub height: i32,
    pub duration: i32,
    pub mime_type: Option<String>,
    pub file_size: Option<i32>,
}

#[derive(Debug, Serialize)]
struct SendMessageParams {
    chat_id: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: Vec<&'static str>,
}
