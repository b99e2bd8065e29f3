//! # Switchboard Core
//!
//! Core types, configuration, and logging for Switchboard.
//!
//! This crate provides:
//! - The message model shared by every channel (session keys, inbound and
//!   outbound messages, delivery results)
//! - Configuration loading and validation (JSON5 format)
//! - Per-component structured logging with injected loggers
//! - Secret wrappers and input validation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod secrets;
pub mod types;
pub mod validation;

pub use config::{Config, ConfigError};
pub use logging::{Logger, LoggingError};
pub use secrets::{ApiKey, scrub_secrets};
pub use types::{
    ChannelId, DeliveryResult, InboundMessage, OutboundMessage, PeerId, PeerType, SessionKey,
};
pub use validation::{ValidationError, validate_message_content, validate_raw_payload};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::logging::Logger;
    pub use crate::secrets::ApiKey;
    pub use crate::types::*;
    pub use crate::validation::validate_message_content;
}
