use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sfu: SfuSettings,
    pub signaling: SignalingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Signaling URL handed to the client page. When unset the page is
    /// pointed at `ws://<request Host header>/websocket`.
    pub public_ws_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            public_ws_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Which published tracks are forwarded to which sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingMode {
    /// Every track goes to every other session
    #[default]
    Mesh,
    /// Only tracks published by broadcaster sessions are forwarded
    Broadcast,
}

/// Selective forwarding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuSettings {
    pub forwarding: ForwardingMode,
    /// Consecutive reconciliation passes before deferring to the cooldown retry
    pub max_sync_attempts: u32,
    /// Delay before the deferred reconciliation retry runs
    pub sync_retry_cooldown_ms: u64,
    /// Period of the keyframe request ticker
    pub keyframe_interval_ms: u64,
    /// Size of the per-track RTP read buffer
    pub rtp_buffer_size: usize,
    /// STUN/TURN URLs handed to the transport engine
    pub ice_servers: Vec<String>,
}

impl Default for SfuSettings {
    fn default() -> Self {
        Self {
            forwarding: ForwardingMode::Mesh,
            max_sync_attempts: 25,
            sync_retry_cooldown_ms: 3000,
            keyframe_interval_ms: 3000,
            rtp_buffer_size: 1500,
            ice_servers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Largest accepted WebSocket message in bytes
    pub max_message_size: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        // SDP with many candidates stays well below this
        Self {
            max_message_size: 64 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // FANOUT_SERVER__HTTP_PORT, FANOUT_SFU__FORWARDING, ...
        builder = builder.add_source(
            Environment::with_prefix("FANOUT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check the configuration for values the server cannot run with.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.http_port == 0 {
            errors.push("server.http_port must be greater than 0".to_string());
        }
        if let Some(url) = &self.server.public_ws_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                errors.push(format!(
                    "server.public_ws_url must start with ws:// or wss://, got '{url}'"
                ));
            }
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }
        if self.sfu.max_sync_attempts == 0 {
            errors.push("sfu.max_sync_attempts must be at least 1".to_string());
        }
        if self.sfu.sync_retry_cooldown_ms == 0 {
            errors.push("sfu.sync_retry_cooldown_ms must be greater than 0".to_string());
        }
        if self.sfu.keyframe_interval_ms == 0 {
            errors.push("sfu.keyframe_interval_ms must be greater than 0".to_string());
        }
        // Must hold one MTU-sized RTP packet
        if self.sfu.rtp_buffer_size < 1200 {
            errors.push(format!(
                "sfu.rtp_buffer_size must be at least 1200 bytes, got {}",
                self.sfu.rtp_buffer_size
            ));
        }
        for url in &self.sfu.ice_servers {
            if !(url.starts_with("stun:") || url.starts_with("turn:") || url.starts_with("turns:")) {
                errors.push(format!("sfu.ice_servers entry '{url}' is not a stun:/turn: URL"));
            }
        }
        if self.signaling.max_message_size < 1024 {
            errors.push("signaling.max_message_size must be at least 1024 bytes".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
