//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key has a default matching the
//! chat backend's stock deployment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ChatError;

/// Default WebSocket endpoint of the chat backend.
pub const DEFAULT_ENDPOINT_URL: &str = "ws://localhost:8080/ws";
/// Default maximum number of automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default delay before an automatic reconnect, in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
/// Default heart-beat interval in both directions, in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 4_000;
/// Default delay of the transport's own session retry, in milliseconds.
pub const DEFAULT_TRANSPORT_RECONNECT_DELAY_MS: u64 = 5_000;
/// Default prefix of per-room inbound topics.
pub const DEFAULT_ROOM_TOPIC_PREFIX: &str = "/topic/chat/room";
/// Default outbound destination for chat messages.
pub const DEFAULT_SEND_DESTINATION: &str = "/app/chat.message";

/// Top-level client configuration.
///
/// Loaded once at startup via [`ChatConfig::from_env`], or built from
/// [`ChatConfig::default`] in tests and embedders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// WebSocket endpoint (e.g. `ws://localhost:8080/ws`).
    pub endpoint_url: String,

    /// Path of the persisted credential file.
    pub credential_path: PathBuf,

    /// Key of the token entry inside the credential file.
    pub credential_key: String,

    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Milliseconds between a failed handshake and the next attempt.
    pub reconnect_delay_ms: u64,

    /// Expected server heart-beat interval in milliseconds (0 = off).
    pub heartbeat_incoming_ms: u64,

    /// Client heart-beat interval in milliseconds (0 = off).
    pub heartbeat_outgoing_ms: u64,

    /// Milliseconds the transport waits before re-opening a lost session.
    pub transport_reconnect_delay_ms: u64,

    /// Prefix of per-room topics; the room id is appended as a segment.
    pub room_topic_prefix: String,

    /// Destination outbound chat messages are published to.
    pub send_destination: String,

    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            credential_path: PathBuf::from(".chat-credentials.json"),
            credential_key: "token".to_string(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            heartbeat_incoming_ms: DEFAULT_HEARTBEAT_MS,
            heartbeat_outgoing_ms: DEFAULT_HEARTBEAT_MS,
            transport_reconnect_delay_ms: DEFAULT_TRANSPORT_RECONNECT_DELAY_MS,
            room_topic_prefix: DEFAULT_ROOM_TOPIC_PREFIX.to_string(),
            send_destination: DEFAULT_SEND_DESTINATION.to_string(),
            notification_capacity: 64,
        }
    }
}

impl ChatConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the defaults when a variable is not set or cannot be
    /// parsed. Calls `dotenvy::dotenv().ok()` to optionally load a `.env`
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if the resulting configuration fails
    /// [`ChatConfig::validate`].
    pub fn from_env() -> Result<Self, ChatError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            endpoint_url: std::env::var("CHAT_WS_URL").unwrap_or(defaults.endpoint_url),
            credential_path: std::env::var("CHAT_CREDENTIAL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.credential_path),
            credential_key: std::env::var("CHAT_CREDENTIAL_KEY")
                .unwrap_or(defaults.credential_key),
            max_reconnect_attempts: parse_env(
                "CHAT_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            reconnect_delay_ms: parse_env("CHAT_RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            heartbeat_incoming_ms: parse_env(
                "CHAT_HEARTBEAT_INCOMING_MS",
                defaults.heartbeat_incoming_ms,
            ),
            heartbeat_outgoing_ms: parse_env(
                "CHAT_HEARTBEAT_OUTGOING_MS",
                defaults.heartbeat_outgoing_ms,
            ),
            transport_reconnect_delay_ms: parse_env(
                "CHAT_TRANSPORT_RECONNECT_DELAY_MS",
                defaults.transport_reconnect_delay_ms,
            ),
            room_topic_prefix: std::env::var("CHAT_ROOM_TOPIC_PREFIX")
                .unwrap_or(defaults.room_topic_prefix),
            send_destination: std::env::var("CHAT_SEND_DESTINATION")
                .unwrap_or(defaults.send_destination),
            notification_capacity: parse_env(
                "CHAT_NOTIFICATION_CAPACITY",
                defaults.notification_capacity,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if the endpoint is not a `ws://` or
    /// `wss://` URL, a destination is not an absolute path, or the
    /// notification capacity is zero.
    pub fn validate(&self) -> Result<(), ChatError> {
        if !(self.endpoint_url.starts_with("ws://") || self.endpoint_url.starts_with("wss://")) {
            return Err(ChatError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint_url
            )));
        }
        if !self.room_topic_prefix.starts_with('/') || !self.send_destination.starts_with('/') {
            return Err(ChatError::Config(
                "topic prefix and send destination must start with '/'".to_string(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(ChatError::Config(
                "notification capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before an automatic reconnect.
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Delay of the transport's own session retry.
    #[must_use]
    pub const fn transport_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.transport_reconnect_delay_ms)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
