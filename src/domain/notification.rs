//! User-visible connection notifications.
//!
//! The manager raises a [`Notification`] when the chat service becomes
//! available and when automatic reconnection gives up. The presentation
//! layer decides how to show them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification, for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Positive confirmation.
    Success,
    /// Actionable failure.
    Error,
}

/// Connection notification published on the
/// [`NotificationBus`](super::NotificationBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Handshake completed; the chat service is usable.
    Connected {
        /// When the handshake completed.
        timestamp: DateTime<Utc>,
    },
    /// Reconnect attempts are exhausted; the user must intervene.
    ConnectionFailed {
        /// Attempts made before giving up.
        attempts: u32,
        /// When the manager gave up.
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    /// Builds a [`Notification::Connected`] stamped now.
    #[must_use]
    pub fn connected() -> Self {
        Self::Connected {
            timestamp: Utc::now(),
        }
    }

    /// Builds a [`Notification::ConnectionFailed`] stamped now.
    #[must_use]
    pub fn connection_failed(attempts: u32) -> Self {
        Self::ConnectionFailed {
            attempts,
            timestamp: Utc::now(),
        }
    }

    /// Presentation severity.
    #[must_use]
    pub const fn level(&self) -> NotificationLevel {
        match self {
            Self::Connected { .. } => NotificationLevel::Success,
            Self::ConnectionFailed { .. } => NotificationLevel::Error,
        }
    }

    /// Text shown to the user.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "Chat service connected.",
            Self::ConnectionFailed { .. } => {
                "Could not connect to the chat service. Please refresh the page."
            }
        }
    }

    /// When the notification was raised.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Connected { timestamp } | Self::ConnectionFailed { timestamp, .. } => *timestamp,
        }
    }
}
