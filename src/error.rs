//! # Error Handling
//!
//! Error types for the bridge. Every failure the protocol core can hit falls
//! into one of four buckets, and each bucket has a fixed recovery policy:
//!
//! - **Transport**: the WebSocket failed or closed. Terminal for the connection.
//! - **Parse**: an inbound frame was malformed. The frame is dropped.
//! - **Decode**: an accumulated WAV buffer could not be parsed. The audio unit
//!   is skipped, the response cycle continues.
//! - **Config**: configuration could not be loaded or failed validation.
//!
//! ## Key Rust Concepts:
//! - **enum with data**: each variant carries a human-readable message
//! - **From trait**: lets `?` convert library errors into `BridgeError`
//! - **Display + Error**: make `BridgeError` usable with `anyhow` at the binary boundary

use std::fmt;

/// Errors raised by the bridge.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(BridgeError::Decode("missing data chunk".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Connection failed, was refused, or dropped mid-stream
    Transport(String),

    /// Inbound frame was not valid JSON, had an unknown `type`, or lacked a required field
    Parse(String),

    /// Accumulated audio is not a usable WAV container
    Decode(String),

    /// Configuration file or environment variable problems
    Config(String),
}

impl BridgeError {
    /// Short machine-readable name of the error category, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Transport(_) => "transport_error",
            BridgeError::Parse(_) => "parse_error",
            BridgeError::Decode(_) => "decode_error",
            BridgeError::Config(_) => "config_error",
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Transport(msg) => write!(f, "Transport error: {}", msg),
            BridgeError::Parse(msg) => write!(f, "Parse error: {}", msg),
            BridgeError::Decode(msg) => write!(f, "Decode error: {}", msg),
            BridgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Malformed JSON, unknown `type` tags and missing fields all surface here.
impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Parse(format!("JSON parsing error: {}", err))
    }
}

/// A chunk whose `data` field is not valid base64 is a malformed frame.
impl From<base64::DecodeError> for BridgeError {
    fn from(err: base64::DecodeError) -> Self {
        BridgeError::Parse(format!("base64 decoding error: {}", err))
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

/// Shorthand for `Result<T, BridgeError>`.
pub type BridgeResult<T> = Result<T, BridgeError>;
