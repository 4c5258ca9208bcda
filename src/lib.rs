//! # LabBot Bridge
//!
//! Connects to the counterpart process over a WebSocket, reassembles the
//! streamed audio, text and animation fragments into responses, and hands them
//! to the registered observers.
//!
//! ## Architecture:
//! - **config**: Bridge configuration (TOML file + environment variables)
//! - **state**: Shared configuration and wire-level counters
//! - **error**: Error categories and their recovery policy
//! - **audio**: Chunk accumulation and WAV decoding
//! - **protocol**: Wire messages, response aggregation, frame dispatch
//! - **websocket**: Connection lifecycle and the serialized event loop
//!
//! ## Embedding:
//! ```rust,ignore
//! use labbot_bridge::{AppConfig, BridgeClient, BridgeState};
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//!
//! let mut client = BridgeClient::new(BridgeState::new(config));
//! client.on_response_ready(|response| play(response));
//! client.start()?;
//!
//! // when the avatar finishes an animation
//! client.send_animation_end()?;
//!
//! client.stop().await;
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod state;
pub mod websocket;

pub use crate::config::AppConfig;
pub use crate::error::{BridgeError, BridgeResult};
pub use crate::protocol::response::{AudioUnit, Response};
pub use crate::state::{BridgeMetrics, BridgeState};
pub use crate::websocket::{BridgeClient, ConnectionState};
