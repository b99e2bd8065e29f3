//! Channel registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;

use switchboard_core::types::{DeliveryResult, OutboundMessage, SessionKey};

use crate::traits::{Channel, ChannelError, ChannelProbe};

/// Registry of channels keyed by name.
pub struct ChannelRegistry {
    channels: BTreeMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// Register a channel, returning the one it replaced, if any.
    pub fn register(&mut self, channel: Arc<dyn Channel>) -> Option<Arc<dyn Channel>> {
        self.channels.insert(channel.name().to_string(), channel)
    }

    /// Remove a channel by name.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.remove(name)
    }

    /// Get a channel by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// List all channel names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channels are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterate over registered channels.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Channel>> {
        self.channels.values()
    }

    /// Send through the named channel.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChannel` if no channel has that name, otherwise
    /// whatever the channel's `send` returns.
    pub async fn send(
        &self,
        channel: &str,
        session_key: &SessionKey,
        content: OutboundMessage,
    ) -> Result<DeliveryResult, ChannelError> {
        let target = self
            .get(channel)
            .ok_or_else(|| ChannelError::UnknownChannel(channel.to_string()))?;
        target.send(session_key, content).await
    }

    /// Connect every channel concurrently.
    pub async fn connect_all(&self) -> BTreeMap<String, Result<(), ChannelError>> {
        self.for_each(|channel| async move { channel.connect().await })
            .await
    }

    /// Disconnect every channel concurrently.
    pub async fn disconnect_all(&self) -> BTreeMap<String, Result<(), ChannelError>> {
        self.for_each(|channel| async move { channel.disconnect().await })
            .await
    }

    /// Probe every channel concurrently.
    pub async fn probe_all(&self) -> BTreeMap<String, Result<ChannelProbe, ChannelError>> {
        self.for_each(|channel| async move { channel.probe().await })
            .await
    }

    async fn for_each<T, F, Fut>(&self, op: F) -> BTreeMap<String, T>
    where
        F: Fn(Arc<dyn Channel>) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let names = self.channels.keys().cloned();
        let results = join_all(self.channels.values().map(|c| op(Arc::clone(c)))).await;
        names.zip(results).collect()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
