//! # Configuration Management
//!
//! Loads bridge configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with LABBOT_ prefix, `__` between sections)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `BRIDGE_ENDPOINT` environment variable
//! 2. Environment variables (LABBOT_BRIDGE__ENDPOINT, LABBOT_AUDIO__VERIFY_CHECKSUM, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::env;

/// Main configuration that contains all settings.
///
/// ## Why separate config structs:
/// The connection settings and the audio handling settings change for
/// different reasons, so they live in their own sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub audio: AudioConfig,
}

/// Connection settings for the counterpart process.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the counterpart (e.g., "ws://localhost:6789")
/// - `client_name`: Identifier sent in the registration frame right after connecting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub endpoint: String,
    pub client_name: String,
}

/// Audio stream handling settings.
///
/// ## Fields:
/// - `verify_checksum`: Compare the SHA-1 of each accumulated audio unit with the
///   `checksum` field of `audio_end` (logging only, never drops audio)
/// - `log_chunks`: Log the base64 payload of every audio chunk at trace level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub verify_checksum: bool,
    pub log_chunks: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig {
                endpoint: "ws://localhost:6789".to_string(),
                client_name: "UnrealClient".to_string(),
            },
            audio: AudioConfig {
                verify_checksum: false,
                log_chunks: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with LABBOT
    /// 4. Handle the `BRIDGE_ENDPOINT` shortcut
    ///
    /// ## Environment Variables:
    /// - `LABBOT_BRIDGE__ENDPOINT=ws://10.0.0.4:6789`: Override endpoint
    /// - `LABBOT_BRIDGE__CLIENT_NAME=StageClient`: Override registration name
    /// - `LABBOT_AUDIO__VERIFY_CHECKSUM=true`: Enable checksum verification
    /// - `BRIDGE_ENDPOINT=ws://10.0.0.4:6789`: Short form used by launch scripts
    pub fn load() -> BridgeResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("LABBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(endpoint) = env::var("BRIDGE_ENDPOINT") {
            settings = settings.set_override("bridge.endpoint", endpoint)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - The endpoint is a WebSocket URL (`ws://` or `wss://`)
    /// - The client name is not blank (the counterpart keys connections by it)
    pub fn validate(&self) -> BridgeResult<()> {
        let endpoint = self.bridge.endpoint.trim();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(BridgeError::Config(format!(
                "Bridge endpoint must start with ws:// or wss://, got '{}'",
                self.bridge.endpoint
            )));
        }

        if self.bridge.client_name.trim().is_empty() {
            return Err(BridgeError::Config(
                "Bridge client name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
