//! Chat message payloads exchanged with the backend.
//!
//! Outbound messages are [`ChatMessageRequest`]s published to the send
//! destination. Inbound messages reach callbacks as raw JSON; [`ChatMessage`]
//! is a typed view callers can decode into.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::RoomId;

/// Kind of chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment.
    Image,
    /// File attachment.
    File,
    /// Participant joined the room.
    Enter,
    /// Participant left the room.
    Leave,
    /// Price offer on the room's product.
    Offer,
}

impl MessageType {
    /// Wire tag, e.g. `"TEXT"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::File => "FILE",
            Self::Enter => "ENTER",
            Self::Leave => "LEAVE",
            Self::Offer => "OFFER",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content handed to `send_message` by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message body.
    pub content: String,
    /// Message kind; `None` means [`MessageType::Text`].
    pub message_type: Option<MessageType>,
}

impl OutboundMessage {
    /// A plain-text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: None,
        }
    }
}

/// JSON payload published to the send destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    /// Target room.
    #[serde(alias = "chatroomId")]
    pub room_id: RoomId,
    /// Message body.
    pub content: String,
    /// Message kind tag.
    pub message_type: MessageType,
}

impl ChatMessageRequest {
    /// Builds the payload for `room_id`, defaulting the type to text.
    #[must_use]
    pub fn new(room_id: RoomId, message: OutboundMessage) -> Self {
        Self {
            room_id,
            content: message.content,
            message_type: message.message_type.unwrap_or_default(),
        }
    }
}

/// Typed view of a message broadcast on a room topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Backend-assigned id, absent for transient events.
    #[serde(default)]
    pub message_id: Option<i64>,
    /// Room the message belongs to.
    pub chatroom_id: RoomId,
    /// Sender's account email.
    pub sender_email: String,
    /// Message body.
    pub content: String,
    /// Message kind tag, kept as a string so unknown kinds still decode.
    pub message_type: String,
    /// Send time as formatted by the backend.
    #[serde(default)]
    pub sent_at: Option<String>,
    /// Read flag.
    #[serde(default)]
    pub is_read: Option<bool>,
    /// Sender's display name.
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Sender's avatar URL.
    #[serde(default)]
    pub sender_profile_url: Option<String>,
    /// Product the room is negotiating over.
    #[serde(default)]
    pub product_id: Option<i64>,
}

impl ChatMessage {
    /// Decodes a typed message from an inbound JSON value.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if required fields are missing or mistyped.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
