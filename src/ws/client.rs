//! WebSocket STOMP transport: connector and handle.
//!
//! [`WsStompConnector::open`] spawns one session task per client and
//! returns a [`WsStompHandle`] that forwards commands to it over a channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::connection::{ClientCommand, run_client};
use crate::error::ChatError;
use crate::transport::{ConnectParams, EventSink, TransportConnector, TransportHandle};

/// Opens STOMP sessions over `tokio-tungstenite` WebSockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsStompConnector;

impl WsStompConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransportConnector for WsStompConnector {
    fn open(
        &self,
        params: ConnectParams,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>, ChatError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::Transport(format!("no tokio runtime: {e}")))?;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        runtime.spawn(run_client(params, command_rx, sink, Arc::clone(&connected)));

        Ok(Box::new(WsStompHandle {
            commands,
            connected,
        }))
    }
}

/// Handle to one session task.
///
/// Dropping the handle stops the task as if [`TransportHandle::deactivate`]
/// had been called.
#[derive(Debug)]
pub struct WsStompHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
    connected: Arc<AtomicBool>,
}

impl WsStompHandle {
    fn send(&self, command: ClientCommand) -> Result<(), ChatError> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::Transport("session task has stopped".to_string()))
    }
}

impl TransportHandle for WsStompHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, destination: &str) -> Result<(), ChatError> {
        self.send(ClientCommand::Subscribe(destination.to_string()))
    }

    fn unsubscribe(&mut self, destination: &str) -> Result<(), ChatError> {
        self.send(ClientCommand::Unsubscribe(destination.to_string()))
    }

    fn publish(&mut self, destination: &str, body: String) -> Result<(), ChatError> {
        self.send(ClientCommand::Publish {
            destination: destination.to_string(),
            body,
        })
    }

    fn deactivate(&mut self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.commands.send(ClientCommand::Deactivate);
    }
}
