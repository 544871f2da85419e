//! Topic subscription bookkeeping.
//!
//! Tracks which room topics the application wants delivered and the
//! callback each one routes to. Entries survive connection loss so they can
//! be replayed after a reconnect.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{RoomId, Topic};

/// Callback invoked once per inbound message on a topic.
pub type MessageCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Map from room topic to its message callback.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<Topic, MessageCallback>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `callback` for `topic`, replacing any previous callback.
    pub fn insert(&mut self, topic: Topic, callback: MessageCallback) {
        self.entries.insert(topic, callback);
    }

    /// Removes the entry for `topic`, returning its callback.
    pub fn remove(&mut self, topic: &Topic) -> Option<MessageCallback> {
        self.entries.remove(topic)
    }

    /// Callback registered for `topic`.
    #[must_use]
    pub fn get(&self, topic: &Topic) -> Option<&MessageCallback> {
        self.entries.get(topic)
    }

    /// Returns `true` if `room_id` has a registered topic.
    #[must_use]
    pub fn contains_room(&self, room_id: RoomId) -> bool {
        self.entries.keys().any(|t| t.room_id() == room_id)
    }

    /// Copies out every `(topic, callback)` pair for replay.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Topic, MessageCallback)> {
        self.entries
            .iter()
            .map(|(topic, cb)| (topic.clone(), Arc::clone(cb)))
            .collect()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
