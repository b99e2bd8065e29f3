//! Channel traits.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use switchboard_core::types::{DeliveryResult, InboundMessage, OutboundMessage, SessionKey};
use switchboard_core::validation::ValidationError;

/// Channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Transport setup or teardown failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel not connected.
    #[error("Channel not connected")]
    NotConnected,

    /// No such session on this channel.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionKey),

    /// No channel registered under this name.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// The transport refused the payload.
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// Raw transport data is malformed.
    #[error("Malformed input: {0}")]
    Format(String),
}

/// Broad failure classes of the channel contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport setup/teardown failure.
    Connection,
    /// Send rejected or undeliverable.
    Delivery,
    /// Malformed raw session data.
    Format,
}

impl ChannelError {
    /// Failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) | Self::AuthFailed(_) | Self::Config(_) => ErrorKind::Connection,
            Self::NotConnected
            | Self::UnknownSession(_)
            | Self::UnknownChannel(_)
            | Self::Rejected(_)
            | Self::RateLimited
            | Self::Network(_) => ErrorKind::Delivery,
            Self::Format(_) => ErrorKind::Format,
        }
    }

    /// Whether this is a delivery failure.
    #[must_use]
    pub fn is_delivery(&self) -> bool {
        self.kind() == ErrorKind::Delivery
    }
}

impl From<ValidationError> for ChannelError {
    fn from(err: ValidationError) -> Self {
        Self::Format(err.to_string())
    }
}

/// Logical connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Not connected (initial state).
    #[default]
    Disconnected,
    /// Connected and able to send/receive.
    Connected,
}

/// Channel capabilities.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ChannelCapabilities {
    /// Supports text messages.
    pub text: bool,
    /// Supports images.
    pub images: bool,
    /// Supports voice messages.
    pub voice: bool,
    /// Supports files.
    pub files: bool,
    /// Supports threads.
    pub threads: bool,
    /// Longest text a single transport message can carry, if limited.
    pub text_chunk_limit: Option<usize>,
}

/// Channel health probe result.
#[derive(Debug, Clone)]
pub struct ChannelProbe {
    /// Whether channel is connected.
    pub connected: bool,
    /// Account/bot identifier.
    pub account_id: Option<String>,
    /// Account display name.
    pub display_name: Option<String>,
    /// Inbound messages waiting for the handler.
    pub pending_inbound: usize,
    /// Error message if not healthy.
    pub error: Option<String>,
}

/// Receives inbound messages from a channel.
///
/// Any `Fn(InboundMessage) -> impl Future<Output = ()>` closure is a handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one inbound message.
    async fn handle(&self, message: InboundMessage);
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: InboundMessage) {
        (self)(message).await;
    }
}

/// Core channel trait.
///
/// Lifecycle is driven by the host: construct, [`connect`](Channel::connect),
/// operate, [`disconnect`](Channel::disconnect).
///
/// Inbound messages go to the handler registered with
/// [`on_message`](Channel::on_message). Only one handler is active; a new
/// registration replaces the previous one. Each message is handed to the
/// handler exactly once, in the order the transport observed it. Messages
/// arriving while the handler is busy, or before any handler exists, are
/// buffered rather than dropped.
///
/// `send` may be called concurrently from any number of tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "telegram"). Stable; used for routing and logging.
    fn name(&self) -> &str;

    /// Human-readable label.
    fn label(&self) -> &str {
        self.name()
    }

    /// Channel capabilities.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Current logical state.
    fn state(&self) -> ChannelState;

    /// Establish the transport session.
    ///
    /// Resolves once the channel can send and receive. Connecting a connected
    /// channel is a no-op.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Tear down the transport session and release its resources.
    ///
    /// Safe to call when never connected or already disconnected.
    async fn disconnect(&self) -> Result<(), ChannelError>;

    /// Register the inbound message handler, replacing any previous one.
    fn on_message(&self, handler: Arc<dyn MessageHandler>);

    /// Deliver `content` to the session identified by `session_key`.
    ///
    /// Fails with a delivery error if the session is unknown, the channel is
    /// disconnected, or the transport rejects the payload.
    async fn send(
        &self,
        session_key: &SessionKey,
        content: OutboundMessage,
    ) -> Result<DeliveryResult, ChannelError>;

    /// Derive the session key for a transport-specific raw payload.
    ///
    /// Deterministic for a given channel configuration and free of side
    /// effects. Malformed input yields [`ChannelError::Format`].
    fn session_key(&self, raw: &serde_json::Value) -> Result<SessionKey, ChannelError>;

    /// Check channel health.
    async fn probe(&self) -> Result<ChannelProbe, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_error_kinds() {
        assert_eq!(ChannelError::Connection("x".into()).kind(), ErrorKind::Connection);
        assert_eq!(ChannelError::AuthFailed("x".into()).kind(), ErrorKind::Connection);
        assert_eq!(ChannelError::NotConnected.kind(), ErrorKind::Delivery);
        assert_eq!(
            ChannelError::UnknownSession(SessionKey::new("s")).kind(),
            ErrorKind::Delivery
        );
        assert_eq!(ChannelError::RateLimited.kind(), ErrorKind::Delivery);
        assert_eq!(ChannelError::Format("x".into()).kind(), ErrorKind::Format);
        assert!(ChannelError::Rejected("x".into()).is_delivery());
        assert!(!ChannelError::Format("x".into()).is_delivery());
    }

    #[test]
    fn test_validation_error_is_format() {
        let err: ChannelError = ValidationError::Malformed("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler: Arc<dyn MessageHandler> = Arc::new(move |_msg: InboundMessage| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let message = crate::testing::sample_message("1");
        handler.handle(message.clone()).await;
        handler.handle(message).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
