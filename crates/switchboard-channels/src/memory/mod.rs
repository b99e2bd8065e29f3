//! In-process channel.
//!
//! Loopback transport with no network underneath. Sessions are opened
//! explicitly or by injecting an inbound message, and everything sent to a
//! session lands in that session's outbox. Useful for tests, local
//! development and wiring checks.
//!
//! Raw payloads look like:
//!
//! ```json
//! { "peer_id": "alice", "peer_type": "dm", "text": "hi", "id": "m-1" }
//! ```
//!
//! Only `peer_id` (string or integer) is required.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use switchboard_core::config::MemoryConfig;
use switchboard_core::logging::Logger;
use switchboard_core::types::{
    ChannelId, DeliveryResult, InboundMessage, OutboundMessage, PeerId, PeerType, SessionKey,
};
use switchboard_core::validation::{limits, validate_message_content, validate_raw_payload};

use crate::inbox::Inbox;
use crate::traits::{
    Channel, ChannelCapabilities, ChannelError, ChannelProbe, ChannelState, MessageHandler,
};

/// In-process channel adapter.
pub struct MemoryChannel {
    id: ChannelId,
    account: String,
    connected: AtomicBool,
    sessions: Mutex<HashMap<SessionKey, Vec<OutboundMessage>>>,
    next_message_id: AtomicU64,
    inbox: Inbox,
    logger: Logger,
}

impl MemoryChannel {
    /// Create a memory channel with the given name and account `local`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parts(ChannelId::new(name), "local".to_string(), Logger::disabled())
    }

    /// Create a memory channel from configuration.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::with_parts(
            ChannelId::new(config.name.clone()),
            config.account.clone(),
            Logger::disabled(),
        )
    }

    /// Attach a logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.inbox.set_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// Use a different account ID in session keys.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    fn with_parts(id: ChannelId, account: String, logger: Logger) -> Self {
        Self {
            id,
            account,
            connected: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
            inbox: Inbox::new(logger.clone()),
            logger,
        }
    }

    /// Make a session known so that sends to it succeed.
    pub async fn open_session(&self, session_key: SessionKey) {
        self.sessions.lock().await.entry(session_key).or_default();
    }

    /// Simulate an inbound message from the peer described by `raw`.
    ///
    /// Opens the session if needed, queues the message for the handler and
    /// returns the session key.
    ///
    /// # Errors
    ///
    /// Fails with `NotConnected` when disconnected and `Format` when `raw`
    /// is malformed.
    pub async fn inject(&self, raw: serde_json::Value) -> Result<SessionKey, ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }

        let (peer_type, peer_id) = peer_of(&raw)?;
        let session_key = SessionKey::build(&self.id, &self.account, peer_type, &peer_id);

        let text = match raw.get("text") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => {
                validate_message_content(s, limits::MAX_MESSAGE_LENGTH)?
            }
            Some(_) => return Err(ChannelError::Format("text must be a string".to_string())),
        };

        let id = raw
            .get("id")
            .and_then(scalar_string)
            .unwrap_or_else(|| format!("in-{}", uuid::Uuid::new_v4()));

        let message = InboundMessage {
            id,
            channel: self.id.clone(),
            account_id: self.account.clone(),
            session_key: session_key.clone(),
            peer_id,
            peer_type,
            content: text,
            attachments: Vec::new(),
            timestamp: chrono::Utc::now(),
            reply_to: raw.get("reply_to").and_then(scalar_string),
            thread_id: raw.get("thread_id").and_then(scalar_string),
            mentions: Vec::new(),
            raw: Some(raw),
        };

        self.open_session(session_key.clone()).await;
        self.logger.in_scope(|| {
            tracing::debug!(session = %session_key, message_id = %message.id, "inbound message");
        });
        self.inbox.push(message);

        Ok(session_key)
    }

    /// Messages delivered to a session so far, oldest first.
    pub async fn outbox(&self, session_key: &SessionKey) -> Option<Vec<OutboundMessage>> {
        self.sessions.lock().await.get(session_key).cloned()
    }

    /// Known session keys.
    pub async fn sessions(&self) -> Vec<SessionKey> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Wait until every injected message has been handled.
    pub async fn drained(&self) {
        self.inbox.drained().await;
    }
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn peer_of(raw: &serde_json::Value) -> Result<(PeerType, PeerId), ChannelError> {
    validate_raw_payload(raw)?;

    let peer_id = raw
        .get("peer_id")
        .and_then(scalar_string)
        .ok_or_else(|| ChannelError::Format("peer_id is required".to_string()))?;

    let peer_type = match raw.get("peer_type") {
        None | Some(serde_json::Value::Null) => PeerType::Dm,
        Some(serde_json::Value::String(name)) => PeerType::from_name(name)
            .ok_or_else(|| ChannelError::Format(format!("unknown peer_type '{name}'")))?,
        Some(_) => return Err(ChannelError::Format("peer_type must be a string".to_string())),
    };

    Ok((peer_type, PeerId::new(peer_id)))
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        self.id.as_ref()
    }

    fn label(&self) -> &str {
        "Memory"
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            text: true,
            images: true,
            voice: true,
            files: true,
            threads: true,
            text_chunk_limit: None,
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
        self.inbox.start();
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.logger
                .in_scope(|| tracing::info!(channel = %self.id, "memory channel connected"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.logger
                .in_scope(|| tracing::info!(channel = %self.id, "memory channel disconnected"));
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
        if content.is_empty() {
            return Err(ChannelError::Rejected("message is empty".to_string()));
        }

        let mut sessions = self.sessions.lock().await;
        let outbox = sessions
            .get_mut(session_key)
            .ok_or_else(|| ChannelError::UnknownSession(session_key.clone()))?;
        outbox.push(content);
        drop(sessions);

        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.logger
            .in_scope(|| tracing::debug!(session = %session_key, %message_id, "message delivered"));

        Ok(DeliveryResult {
            message_id,
            channel: self.id.clone(),
            session_key: session_key.clone(),
            timestamp: chrono::Utc::now(),
            meta: None,
        })
    }

    fn session_key(&self, raw: &serde_json::Value) -> Result<SessionKey, ChannelError> {
        let (peer_type, peer_id) = peer_of(raw)?;
        Ok(SessionKey::build(&self.id, &self.account, peer_type, &peer_id))
    }

    async fn probe(&self) -> Result<ChannelProbe, ChannelError> {
        Ok(ChannelProbe {
            connected: self.connected.load(Ordering::SeqCst),
            account_id: Some(self.account.clone()),
            display_name: Some(self.id.to_string()),
            pending_inbound: self.inbox.pending(),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_channel_name() {
        let channel = MemoryChannel::new("test");
        assert_eq!(channel.name(), "test");
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[test]
    fn test_from_config() {
        let channel = MemoryChannel::from_config(&MemoryConfig {
            name: "loop".to_string(),
            account: "acct".to_string(),
        });
        let key = channel.session_key(&json!({"peer_id": "bob"})).unwrap();
        assert_eq!(key.as_ref(), "channel:loop:account:acct:dm:bob");
    }

    #[tokio::test]
    async fn test_builders_keep_existing_state() {
        let channel = MemoryChannel::new("test");
        let key = SessionKey::new("kept");
        channel.open_session(key.clone()).await;
        channel.on_message(Arc::new(|_msg: InboundMessage| async {}));
        channel.connect().await.unwrap();

        let channel = channel
            .with_logger(Logger::new("test"))
            .with_account("acct");

        assert_eq!(channel.state(), ChannelState::Connected);
        assert!(channel.inbox.has_handler());
        assert_eq!(channel.sessions().await, vec![key]);
        let raw = json!({"peer_id": "bob"});
        assert_eq!(
            channel.session_key(&raw).unwrap().as_ref(),
            "channel:test:account:acct:dm:bob"
        );
    }

    #[test]
    fn test_session_key_is_deterministic() {
        let channel = MemoryChannel::new("test");
        let raw = json!({"peer_id": 42, "peer_type": "group", "text": "hello"});
        let first = channel.session_key(&raw).unwrap();
        let second = channel.session_key(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_ref(), "channel:test:account:local:group:42");
    }

    #[test]
    fn test_session_key_ignores_message_fields() {
        let channel = MemoryChannel::new("test");
        let a = channel.session_key(&json!({"peer_id": "p", "text": "one"})).unwrap();
        let b = channel.session_key(&json!({"peer_id": "p", "text": "two", "id": "x"})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_session_key_malformed() {
        let channel = MemoryChannel::new("test");
        for raw in [
            json!("peer"),
            json!({}),
            json!({"peer_id": ""}),
            json!({"peer_id": true}),
            json!({"peer_id": "p", "peer_type": "private"}),
        ] {
            let err = channel.session_key(&raw).unwrap_err();
            assert!(matches!(err, ChannelError::Format(_)), "{raw}: {err}");
        }
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let channel = MemoryChannel::new("test");
        let key = SessionKey::new("session-1");
        channel.open_session(key.clone()).await;

        let err = channel.send(&key, OutboundMessage::text("hi")).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let channel = MemoryChannel::new("test");
        channel.connect().await.unwrap();

        let err = channel
            .send(&SessionKey::new("session-1"), OutboundMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownSession(_)));
        assert!(err.is_delivery());
    }

    #[tokio::test]
    async fn test_send_empty_rejected() {
        let channel = MemoryChannel::new("test");
        channel.connect().await.unwrap();
        let key = SessionKey::new("s");
        channel.open_session(key.clone()).await;

        let err = channel.send(&key, OutboundMessage::default()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Rejected(_)));
        assert_eq!(channel.outbox(&key).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_send_lands_in_outbox() {
        let channel = MemoryChannel::new("test");
        channel.connect().await.unwrap();
        let key = SessionKey::new("s");
        channel.open_session(key.clone()).await;

        let first = channel.send(&key, OutboundMessage::text("one")).await.unwrap();
        let second = channel.send(&key, OutboundMessage::text("two")).await.unwrap();

        assert_ne!(first.message_id, second.message_id);
        assert_eq!(first.session_key, key);
        assert_eq!(
            channel.outbox(&key).await.unwrap(),
            vec![OutboundMessage::text("one"), OutboundMessage::text("two")]
        );
    }

    #[tokio::test]
    async fn test_inject_requires_connection() {
        let channel = MemoryChannel::new("test");
        let err = channel.inject(json!({"peer_id": "p"})).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }

    #[tokio::test]
    async fn test_inject_opens_session_and_delivers() {
        let channel = MemoryChannel::new("test");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        channel.on_message(Arc::new(move |msg: InboundMessage| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(msg);
            }
        }));
        channel.connect().await.unwrap();

        let key = channel
            .inject(json!({"peer_id": "alice", "text": "hello\u{0000}", "id": "m-1"}))
            .await
            .unwrap();
        channel.drained().await;

        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, "m-1");
        assert_eq!(received[0].content, "hello");
        assert_eq!(received[0].session_key, key);
        assert_eq!(received[0].peer_id, PeerId::new("alice"));

        assert!(channel.sessions().await.contains(&key));
        channel.send(&key, OutboundMessage::text("hi alice")).await.unwrap();
    }

    #[tokio::test]
    async fn test_inject_rejects_bad_text() {
        let channel = MemoryChannel::new("test");
        channel.connect().await.unwrap();
        let err = channel
            .inject(json!({"peer_id": "p", "text": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Format(_)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let channel = MemoryChannel::new("test");
        channel.disconnect().await.unwrap();
        channel.connect().await.unwrap();
        channel.connect().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
        channel.disconnect().await.unwrap();
        channel.disconnect().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn test_probe() {
        let channel = MemoryChannel::new("test").with_account("acct");
        let probe = channel.probe().await.unwrap();
        assert!(!probe.connected);
        assert_eq!(probe.account_id.as_deref(), Some("acct"));
        assert_eq!(probe.pending_inbound, 0);
    }
}
