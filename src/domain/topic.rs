//! Room topic naming.
//!
//! Every room has exactly one inbound topic, `{prefix}/{room_id}`. The same
//! [`Topic`] is used for subscribing, unsubscribing and routing inbound
//! messages back to their callback.

use std::fmt;

use super::RoomId;

/// A room's inbound topic: the destination path plus the room it encodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    path: String,
    room_id: RoomId,
}

impl Topic {
    /// Destination path, e.g. `/topic/chat/room/42`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Room encoded in the path.
    #[must_use]
    pub const fn room_id(&self) -> RoomId {
        self.room_id
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Builds and parses room topics for a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
}

impl TopicScheme {
    /// Creates a scheme for the given prefix. A trailing `/` is ignored.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Topic for the given room.
    #[must_use]
    pub fn room(&self, room_id: RoomId) -> Topic {
        Topic {
            path: format!("{}/{room_id}", self.prefix),
            room_id,
        }
    }

    /// Recovers the topic from a destination path, or `None` if the path is
    /// not the canonical room topic under this prefix. Spellings such as
    /// `+42`, `042` or ` 42` are rejected.
    #[must_use]
    pub fn parse(&self, destination: &str) -> Option<Topic> {
        let id = destination.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        let topic = self.room(id.parse().ok()?);
        (topic.path == destination).then_some(topic)
    }
}
