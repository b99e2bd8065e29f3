//! # Switchboard Channels
//!
//! The [`Channel`] contract every messaging transport implements, plus the
//! transports themselves.
//!
//! A channel connects to its platform, reports inbound messages to a single
//! registered [`MessageHandler`], delivers outbound messages addressed by
//! [`SessionKey`](switchboard_core::types::SessionKey) and derives session
//! keys from raw platform payloads.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod inbox;
mod registry;
mod traits;

/// In-process memory channel.
pub mod memory;
/// Telegram channel adapter.
pub mod telegram;

#[cfg(test)]
mod testing;

pub use inbox::Inbox;
pub use registry::ChannelRegistry;
pub use traits::{
    Channel, ChannelCapabilities, ChannelError, ChannelProbe, ChannelState, ErrorKind,
    MessageHandler,
};

// Re-export channel implementations
pub use memory::MemoryChannel;
pub use telegram::TelegramChannel;
