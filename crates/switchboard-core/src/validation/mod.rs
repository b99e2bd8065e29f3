//! Input validation and sanitization.
//!
//! Everything a transport hands us is untrusted: inbound text and raw
//! platform payloads are checked here before they reach a handler.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Raw payload has an unexpected shape.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum message content length (64KB).
    pub const MAX_MESSAGE_LENGTH: usize = 64 * 1024;

    /// Maximum raw payload size (1MB).
    pub const MAX_RAW_PAYLOAD_SIZE: usize = 1024 * 1024;

    /// Maximum config file size (1MB).
    pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

    /// Maximum JSON nesting depth.
    pub const MAX_JSON_DEPTH: usize = 32;
}

/// Validate and sanitize message content from channels.
///
/// Performs:
/// 1. Length check (prevent memory exhaustion)
/// 2. Strip null bytes and control chars (except newlines/tabs)
/// 3. Unicode normalization (NFKC)
///
/// # Errors
///
/// Returns `ValidationError::TooLong` if input exceeds `max_len`.
pub fn validate_message_content(input: &str, max_len: usize) -> Result<String, ValidationError> {
    if input.len() > max_len {
        return Err(ValidationError::TooLong {
            max: max_len,
            actual: input.len(),
        });
    }

    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
        .collect();

    let normalized: String = sanitized.nfkc().collect();

    Ok(normalized)
}

/// Validate a raw platform payload before it is parsed.
///
/// The payload must be a JSON object, no larger than
/// [`limits::MAX_RAW_PAYLOAD_SIZE`] when serialized and no deeper than
/// [`limits::MAX_JSON_DEPTH`].
///
/// # Errors
///
/// Returns `ValidationError::Malformed` or `ValidationError::TooLong`.
pub fn validate_raw_payload(raw: &serde_json::Value) -> Result<(), ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::Malformed(
            "expected a JSON object".to_string(),
        ));
    }

    let size = serde_json::to_string(raw)?.len();
    if size > limits::MAX_RAW_PAYLOAD_SIZE {
        return Err(ValidationError::TooLong {
            max: limits::MAX_RAW_PAYLOAD_SIZE,
            actual: size,
        });
    }

    check_json_depth(raw, 0, limits::MAX_JSON_DEPTH)
}

/// Bot ID of a Telegram token of the form `<digits>:<secret>`.
#[must_use]
pub fn telegram_bot_id(token: &str) -> Option<&str> {
    token
        .split_once(':')
        .map(|(id, _)| id)
        .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

/// Check JSON nesting depth to prevent stack overflow.
fn check_json_depth(
    value: &serde_json::Value,
    depth: usize,
    max: usize,
) -> Result<(), ValidationError> {
    if depth > max {
        return Err(ValidationError::Malformed(format!(
            "JSON nesting depth exceeds maximum ({max})"
        )));
    }

    match value {
        serde_json::Value::Array(arr) => {
            for item in arr {
                check_json_depth(item, depth + 1, max)?;
            }
        }
        serde_json::Value::Object(obj) => {
            for (_, item) in obj {
                check_json_depth(item, depth + 1, max)?;
            }
        }
        _ => {}
    }

    Ok(())
}
