//! Transport seam between the connection manager and the wire.
//!
//! A [`TransportConnector`] opens one client per connect attempt. The
//! client reports progress by posting [`TransportEvent`]s through its
//! [`EventSink`]; the manager issues commands through the returned
//! [`TransportHandle`].

use std::fmt::Debug;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::ChatError;
use crate::stomp::Heartbeat;

/// Everything a transport client needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// WebSocket endpoint.
    pub url: String,
    /// Extra headers on the STOMP `CONNECT` frame (authorization).
    pub connect_headers: Vec<(String, String)>,
    /// Requested heart-beat intervals.
    pub heartbeat: Heartbeat,
    /// Delay before the client re-opens a lost session on its own.
    pub reconnect_delay: Duration,
}

/// Progress reported by a transport client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The STOMP session is established (first time or after a
    /// transport-level retry).
    Connected,
    /// The server sent an `ERROR` frame.
    StompError {
        /// Server-provided error summary.
        message: String,
    },
    /// A message arrived on a subscribed destination.
    Message {
        /// Destination the message was published on.
        destination: String,
        /// Raw frame body.
        body: String,
    },
    /// The socket closed or could not be opened.
    Closed {
        /// Why the session ended.
        reason: String,
    },
}

/// Event queued for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// Event from the transport client with the given generation.
    Transport {
        /// Generation of the client that produced the event.
        generation: u64,
        /// The event.
        event: TransportEvent,
    },
    /// The scheduled reconnect delay elapsed.
    ReconnectDue,
}

/// Posts [`TransportEvent`]s from one client onto the manager's queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    queue: mpsc::UnboundedSender<ManagerEvent>,
}

impl EventSink {
    /// Creates a sink tagging events with `generation`.
    #[must_use]
    pub const fn new(generation: u64, queue: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self { generation, queue }
    }

    /// Generation of the client this sink belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Posts an event. Dropped silently if the manager is gone.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.queue.send(ManagerEvent::Transport {
            generation: self.generation,
            event,
        });
    }
}

/// Command interface to one live transport client.
pub trait TransportHandle: Debug + Send {
    /// Whether the STOMP session is currently established.
    fn is_connected(&self) -> bool;

    /// Starts delivery from `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the client can no longer accept
    /// commands.
    fn subscribe(&mut self, destination: &str) -> Result<(), ChatError>;

    /// Stops delivery from `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the client can no longer accept
    /// commands.
    fn unsubscribe(&mut self, destination: &str) -> Result<(), ChatError>;

    /// Publishes `body` to `destination` without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the client can no longer accept
    /// commands.
    fn publish(&mut self, destination: &str, body: String) -> Result<(), ChatError>;

    /// Closes the session and stops any transport-level retry.
    fn deactivate(&mut self);
}

/// Factory for transport clients.
pub trait TransportConnector: Debug + Send + Sync {
    /// Starts a client for `params`, reporting through `sink`.
    ///
    /// Returns as soon as the client is started; the handshake outcome
    /// arrives later as a [`TransportEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the client cannot be started.
    fn open(
        &self,
        params: ConnectParams,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>, ChatError>;
}
