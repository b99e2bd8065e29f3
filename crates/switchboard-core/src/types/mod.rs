//! Core types shared by every channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable name of a messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Create a new channel ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// In-process memory channel.
    #[must_use]
    pub fn memory() -> Self {
        Self("memory".to_string())
    }

    /// Telegram channel.
    #[must_use]
    pub fn telegram() -> Self {
        Self("telegram".to_string())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a peer (user, group or room) on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a new peer ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Session key uniquely identifies a conversation on a channel.
///
/// Keys are opaque to callers. Keys produced by [`SessionKey::build`] use
/// the format `channel:<channel>:account:<account_id>:<peer_type>:<peer_id>`
/// and can be taken apart again with [`SessionKey::parts`]. Channel names and
/// account IDs must not contain `:`; peer IDs may.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    /// Create a session key from an arbitrary string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a session key from components.
    #[must_use]
    pub fn build(
        channel: &ChannelId,
        account_id: &str,
        peer_type: PeerType,
        peer_id: &PeerId,
    ) -> Self {
        Self(format!(
            "channel:{}:account:{}:{}:{}",
            channel.0,
            account_id,
            peer_type.as_str(),
            peer_id.0
        ))
    }

    /// Split a key produced by [`SessionKey::build`] back into its parts.
    ///
    /// Returns `None` for keys in any other format.
    #[must_use]
    pub fn parts(&self) -> Option<SessionParts> {
        let mut it = self.0.splitn(6, ':');

        if it.next()? != "channel" {
            return None;
        }
        let channel = it.next()?;
        if it.next()? != "account" {
            return None;
        }
        let account_id = it.next()?;
        let peer_type = PeerType::from_name(it.next()?)?;
        let peer_id = it.next()?;

        if channel.is_empty() || peer_id.is_empty() {
            return None;
        }

        Some(SessionParts {
            channel: ChannelId::new(channel),
            account_id: account_id.to_string(),
            peer_type,
            peer_id: PeerId::new(peer_id),
        })
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Components of a structured session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParts {
    /// Channel the session lives on.
    pub channel: ChannelId,
    /// Account ID on the channel.
    pub account_id: String,
    /// Type of peer conversation.
    pub peer_type: PeerType,
    /// Peer the session talks to.
    pub peer_id: PeerId,
}

/// Type of peer conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerType {
    /// Direct message.
    #[default]
    Dm,
    /// Group chat.
    Group,
    /// Channel/broadcast.
    Channel,
    /// Thread within a group or channel.
    Thread,
}

impl PeerType {
    /// Get string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dm => "dm",
            Self::Group => "group",
            Self::Channel => "channel",
            Self::Thread => "thread",
        }
    }

    /// Parse the string representation produced by [`PeerType::as_str`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dm" => Some(Self::Dm),
            "group" => Some(Self::Group),
            "channel" => Some(Self::Channel),
            "thread" => Some(Self::Thread),
            _ => None,
        }
    }
}

/// A normalized inbound message from any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Unique message ID from the channel.
    pub id: String,
    /// Channel this message came from.
    pub channel: ChannelId,
    /// Account ID on the channel.
    pub account_id: String,
    /// Session the message belongs to.
    pub session_key: SessionKey,
    /// Peer who sent the message.
    pub peer_id: PeerId,
    /// Type of peer conversation.
    pub peer_type: PeerType,
    /// Text content of the message.
    pub content: String,
    /// Attachments (media, files).
    pub attachments: Vec<Attachment>,
    /// Timestamp when the message was sent.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Reply-to message ID (if this is a reply).
    pub reply_to: Option<String>,
    /// Thread ID (if in a thread).
    pub thread_id: Option<String>,
    /// Mentioned user IDs.
    pub mentions: Vec<String>,
    /// Raw platform-specific data (for debugging).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// A message the caller wants delivered through a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Text content.
    pub text: String,
    /// Attachments (media, files).
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Message ID to reply to.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Thread ID to post into.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Additional platform-specific metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl OutboundMessage {
    /// Create a plain text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Reply to a specific message.
    #[must_use]
    pub fn with_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    /// Post into a thread.
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Attach media.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Whether there is nothing to deliver.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.attachments.is_empty()
    }
}

/// An attachment to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment type.
    pub kind: AttachmentKind,
    /// URL, path or platform file ID of the attachment.
    pub url: String,
    /// MIME type.
    pub mime_type: Option<String>,
    /// File name.
    pub filename: Option<String>,
    /// File size in bytes.
    pub size: Option<u64>,
}

/// Type of attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Image file.
    Image,
    /// Video file.
    Video,
    /// Audio file.
    Audio,
    /// Voice message.
    Voice,
    /// Document/file.
    Document,
    /// Unknown type.
    Unknown,
}

/// Result of delivering an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID assigned by the channel.
    pub message_id: String,
    /// Channel the message was sent to.
    pub channel: ChannelId,
    /// Session the message was delivered to.
    pub session_key: SessionKey,
    /// Timestamp when the message was delivered.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Additional platform-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}
