//! Broadcast channel for user-visible notifications.
//!
//! [`NotificationBus`] wraps a [`tokio::sync::broadcast`] channel. The
//! connection manager publishes every [`Notification`] through the bus and
//! any number of presentation layers subscribe to display them.

use tokio::sync::broadcast;

use super::Notification;

/// Broadcast bus for [`Notification`]s.
///
/// When the ring buffer is full, the oldest notifications are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBus {
    /// Creates a new `NotificationBus` with the given channel capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a notification to all subscribers.
    ///
    /// Returns the number of receivers that received it. With no active
    /// receivers the notification is silently dropped.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Creates a new receiver for all future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
