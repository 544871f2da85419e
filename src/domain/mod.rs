//! Domain layer: room identity, topics, chat payloads, and notifications.
//!
//! This module contains the client-side domain model: room identifiers and
//! the topics derived from them, the JSON payloads exchanged with the chat
//! backend, and the notification bus used to surface connection status.

pub mod chat_message;
pub mod notification;
pub mod notification_bus;
pub mod room_id;
pub mod topic;

pub use chat_message::{ChatMessage, ChatMessageRequest, MessageType, OutboundMessage};
pub use notification::{Notification, NotificationLevel};
pub use notification_bus::NotificationBus;
pub use room_id::RoomId;
pub use topic::{Topic, TopicScheme};
