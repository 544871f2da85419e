//! Chat connection manager: connection lifecycle, reconnect policy, and
//! subscription replay.
//!
//! The manager owns a single transport client at a time. Transport progress
//! and the reconnect timer arrive as [`ManagerEvent`]s on a queue owned by
//! the manager; the owning task pumps them with [`ConnectionManager::next_event`]
//! and [`ConnectionManager::dispatch`]. Nothing here blocks: a scheduled
//! reconnect is only a deadline that `next_event` turns into
//! [`ManagerEvent::ReconnectDue`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::subscription_registry::{MessageCallback, SubscriptionRegistry};
use crate::config::ChatConfig;
use crate::credentials::CredentialStore;
use crate::domain::{
    ChatMessageRequest, Notification, NotificationBus, OutboundMessage, RoomId, TopicScheme,
};
use crate::error::ChatError;
use crate::stomp::Heartbeat;
use crate::transport::{
    ConnectParams, EventSink, ManagerEvent, TransportConnector, TransportEvent, TransportHandle,
};

/// Observable connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live session.
    #[default]
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// The session is established.
    Connected,
}

/// The transport client currently owned by the manager.
#[derive(Debug)]
struct ActiveClient {
    generation: u64,
    handle: Box<dyn TransportHandle>,
}

/// Owns the chat connection and its subscriptions.
///
/// Build exactly one per process at the composition root and hand it to
/// the presentation layer.
pub struct ConnectionManager {
    config: ChatConfig,
    topics: TopicScheme,
    connector: Arc<dyn TransportConnector>,
    credentials: Arc<dyn CredentialStore>,
    notifications: NotificationBus,
    client: Option<ActiveClient>,
    generation: u64,
    connecting: bool,
    reconnect_attempts: u32,
    pending_reconnect: Option<Instant>,
    subscriptions: SubscriptionRegistry,
    events_tx: mpsc::UnboundedSender<ManagerEvent>,
    events_rx: mpsc::UnboundedReceiver<ManagerEvent>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.config.endpoint_url)
            .field("state", &self.connection_state())
            .field("generation", &self.generation)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("pending_reconnect", &self.pending_reconnect)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    #[must_use]
    pub fn new(
        config: ChatConfig,
        connector: Arc<dyn TransportConnector>,
        credentials: Arc<dyn CredentialStore>,
        notifications: NotificationBus,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            topics: TopicScheme::new(&config.room_topic_prefix),
            config,
            connector,
            credentials,
            notifications,
            client: None,
            generation: 0,
            connecting: false,
            reconnect_attempts: 0,
            pending_reconnect: None,
            subscriptions: SubscriptionRegistry::new(),
            events_tx,
            events_rx,
        }
    }

    /// Opens a connection to the chat endpoint.
    ///
    /// A no-op while a handshake is in flight or a session is established.
    /// Cancels any scheduled reconnect. If the attempt budget was exhausted,
    /// a manual connect restores it. Failures are logged and handed to the
    /// reconnect policy; the handshake outcome arrives later through
    /// [`Self::dispatch`].
    pub fn connect(&mut self) {
        if self.connecting || self.is_connected() {
            tracing::debug!(state = ?self.connection_state(), "connect ignored");
            return;
        }
        self.pending_reconnect = None;
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            self.reconnect_attempts = 0;
        }
        self.open_client();
    }

    fn open_client(&mut self) {
        if self.connecting {
            tracing::debug!("connection attempt already in progress");
            return;
        }
        if self.is_connected() {
            tracing::debug!("already connected");
            return;
        }

        self.connecting = true;

        let Some(token) = self.credentials.token() else {
            self.connect_failed(ChatError::MissingCredential);
            return;
        };

        self.release_client();
        self.generation += 1;
        let params = ConnectParams {
            url: self.config.endpoint_url.clone(),
            connect_headers: vec![("Authorization".to_string(), format!("Bearer {token}"))],
            heartbeat: Heartbeat::from_millis(
                self.config.heartbeat_outgoing_ms,
                self.config.heartbeat_incoming_ms,
            ),
            reconnect_delay: self.config.transport_reconnect_delay(),
        };
        let sink = EventSink::new(self.generation, self.events_tx.clone());

        match self.connector.open(params, sink) {
            Ok(handle) => {
                tracing::info!(
                    generation = self.generation,
                    endpoint = %self.config.endpoint_url,
                    "chat connecting"
                );
                self.client = Some(ActiveClient {
                    generation: self.generation,
                    handle,
                });
            }
            Err(e) => self.connect_failed(e),
        }
    }

    /// Applies the bounded fixed-delay reconnect policy.
    fn handle_reconnect(&mut self) {
        let max = self.config.max_reconnect_attempts;
        if self.reconnect_attempts >= max {
            tracing::error!(attempts = self.reconnect_attempts, "chat reconnect attempts exhausted");
            self.pending_reconnect = None;
            let _ = self
                .notifications
                .publish(Notification::connection_failed(self.reconnect_attempts));
            return;
        }

        self.reconnect_attempts += 1;
        tracing::info!(
            attempt = self.reconnect_attempts,
            max,
            delay_ms = self.config.reconnect_delay_ms,
            "chat reconnect scheduled"
        );
        self.pending_reconnect = Some(Instant::now() + self.config.reconnect_delay());
    }

    /// Subscribes `callback` to the topic of `room_id`.
    ///
    /// Each inbound body is parsed as JSON and handed to `callback`; bodies
    /// that fail to parse are logged and dropped without ending the
    /// subscription. The registration survives reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] (nothing is recorded) when the
    /// session is not established, or [`ChatError::Transport`] if the
    /// client rejected the command. Both are logged here.
    pub fn subscribe(&mut self, room_id: RoomId, callback: MessageCallback) -> Result<(), ChatError> {
        let Some(client) = self.client.as_mut().filter(|c| c.handle.is_connected()) else {
            let err = ChatError::NotConnected {
                operation: "subscribe",
            };
            tracing::error!(room_id = %room_id, error = %err, "chat subscribe dropped");
            return Err(err);
        };

        let topic = self.topics.room(room_id);
        let result = client.handle.subscribe(topic.path());
        tracing::debug!(topic = %topic, "chat subscribed");
        self.subscriptions.insert(topic, callback);
        result.inspect_err(|e| {
            tracing::error!(room_id = %room_id, error = %e, "chat subscribe failed");
        })
    }

    /// Publishes `message` to `room_id`, fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] when the session is not
    /// established, [`ChatError::Encode`] if the payload cannot be
    /// serialised, or [`ChatError::Transport`] if the client rejected the
    /// command. All are logged here.
    pub fn send_message(&mut self, room_id: RoomId, message: OutboundMessage) -> Result<(), ChatError> {
        let Some(client) = self.client.as_mut().filter(|c| c.handle.is_connected()) else {
            let err = ChatError::NotConnected {
                operation: "send message",
            };
            tracing::error!(room_id = %room_id, error = %err, "chat message dropped");
            return Err(err);
        };

        let payload = ChatMessageRequest::new(room_id, message);
        let result = serde_json::to_string(&payload)
            .map_err(ChatError::from)
            .and_then(|body| client.handle.publish(&self.config.send_destination, body));
        result.inspect_err(|e| {
            tracing::error!(room_id = %room_id, error = %e, "chat send failed");
        })
    }

    /// Re-issues the transport subscribe for every registered topic with
    /// its original callback.
    fn resubscribe_all(&mut self) {
        for (topic, callback) in self.subscriptions.snapshot() {
            let _ = self.subscribe(topic.room_id(), callback);
        }
    }

    /// Stops delivery for `room_id` and forgets its callback.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotConnected`] (registration kept) when the
    /// session is not established, or [`ChatError::Transport`] if the
    /// client rejected the command. Both are logged here.
    pub fn unsubscribe(&mut self, room_id: RoomId) -> Result<(), ChatError> {
        let Some(client) = self.client.as_mut().filter(|c| c.handle.is_connected()) else {
            let err = ChatError::NotConnected {
                operation: "unsubscribe",
            };
            tracing::warn!(room_id = %room_id, error = %err, "chat unsubscribe ignored");
            return Err(err);
        };

        let topic = self.topics.room(room_id);
        let result = client.handle.unsubscribe(topic.path());
        self.subscriptions.remove(&topic);
        tracing::debug!(topic = %topic, "chat unsubscribed");
        result.inspect_err(|e| {
            tracing::error!(room_id = %room_id, error = %e, "chat unsubscribe failed");
        })
    }

    /// Closes the connection and forgets all subscriptions.
    ///
    /// Safe to call when already disconnected, including while a reconnect
    /// is scheduled; the registry is emptied either way and the scheduled
    /// reconnect is cancelled.
    pub fn disconnect(&mut self) {
        self.pending_reconnect = None;
        self.connecting = false;
        self.subscriptions.clear();
        if let Some(mut client) = self.client.take() {
            client.handle.deactivate();
            tracing::info!(generation = client.generation, "chat disconnected");
        }
    }

    /// Whether the current client has an established session.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.handle.is_connected())
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.connecting {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Automatic reconnects scheduled since the last successful handshake.
    #[must_use]
    pub const fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether an automatic reconnect is scheduled.
    #[must_use]
    pub const fn reconnect_pending(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    /// Returns `true` if `room_id` is registered for delivery.
    #[must_use]
    pub fn is_subscribed(&self, room_id: RoomId) -> bool {
        self.subscriptions.contains_room(room_id)
    }

    /// Number of registered topics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Bus carrying user-visible notifications.
    #[must_use]
    pub const fn notifications(&self) -> &NotificationBus {
        &self.notifications
    }

    /// Waits for the next queued event or the reconnect deadline.
    pub async fn next_event(&mut self) -> ManagerEvent {
        let deadline = self.pending_reconnect;
        tokio::select! {
            event = self.events_rx.recv() => {
                // The manager holds a sender, so the queue never closes.
                event.unwrap_or(ManagerEvent::ReconnectDue)
            }
            () = wait_until(deadline) => ManagerEvent::ReconnectDue,
        }
    }

    /// Waits for and applies the next event.
    pub async fn process_next(&mut self) {
        let event = self.next_event().await;
        self.dispatch(event);
    }

    /// Applies one event.
    ///
    /// Events from superseded clients are ignored.
    pub fn dispatch(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::ReconnectDue => {
                if self.pending_reconnect.take().is_some() {
                    tracing::info!(attempt = self.reconnect_attempts, "chat reconnecting");
                    self.open_client();
                }
            }
            ManagerEvent::Transport { generation, event } => {
                if self.client.as_ref().map(|c| c.generation) != Some(generation) {
                    tracing::debug!(generation, ?event, "stale transport event ignored");
                    return;
                }
                self.on_transport_event(event);
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                tracing::info!(generation = self.generation, "chat connected");
                self.connecting = false;
                self.reconnect_attempts = 0;
                self.pending_reconnect = None;
                let _ = self.notifications.publish(Notification::connected());
                self.resubscribe_all();
            }
            TransportEvent::StompError { message } => {
                self.release_client();
                self.connect_failed(ChatError::Handshake(message));
            }
            TransportEvent::Closed { reason } => {
                if self.connecting {
                    self.release_client();
                    self.connect_failed(ChatError::Handshake(reason));
                } else {
                    tracing::warn!(%reason, "chat session lost; transport will retry");
                }
            }
            TransportEvent::Message { destination, body } => {
                self.deliver(&destination, &body);
            }
        }
    }

    /// Ends a failed attempt. Connection-level errors go to the reconnect
    /// policy; anything else stops retrying.
    fn connect_failed(&mut self, err: ChatError) {
        self.connecting = false;
        if err.is_reconnectable() {
            tracing::error!(code = err.error_code(), error = %err, "chat connection failed");
            self.handle_reconnect();
        } else {
            tracing::error!(
                code = err.error_code(),
                error = %err,
                "chat connection failed; not retrying"
            );
            self.pending_reconnect = None;
        }
    }

    fn release_client(&mut self) {
        if let Some(mut old) = self.client.take() {
            old.handle.deactivate();
            tracing::debug!(generation = old.generation, "chat client released");
        }
    }

    fn deliver(&self, destination: &str, body: &str) {
        let Some(callback) = self
            .topics
            .parse(destination)
            .and_then(|topic| self.subscriptions.get(&topic))
        else {
            tracing::debug!(destination, "message for unregistered topic dropped");
            return;
        };

        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => {
                tracing::debug!(destination, "chat message received");
                callback(value);
            }
            Err(source) => {
                let err = ChatError::Parse {
                    destination: destination.to_string(),
                    source,
                };
                tracing::error!(error = %err, "chat message dropped");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[derive(Debug, Default)]
    struct Calls {
        subscribed: Vec<String>,
        unsubscribed: Vec<String>,
        published: Vec<(String, String)>,
        deactivated: usize,
    }

    #[derive(Debug)]
    struct MockClient {
        params: ConnectParams,
        sink: EventSink,
        connected: Arc<AtomicBool>,
    }

    #[derive(Debug, Default)]
    struct MockConnector {
        clients: Mutex<Vec<MockClient>>,
        calls: Arc<Mutex<Calls>>,
    }

    #[derive(Debug)]
    struct MockHandle {
        connected: Arc<AtomicBool>,
        calls: Arc<Mutex<Calls>>,
    }

    impl TransportHandle for MockHandle {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn subscribe(&mut self, destination: &str) -> Result<(), ChatError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.subscribed.push(destination.to_string());
            }
            Ok(())
        }

        fn unsubscribe(&mut self, destination: &str) -> Result<(), ChatError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.unsubscribed.push(destination.to_string());
            }
            Ok(())
        }

        fn publish(&mut self, destination: &str, body: String) -> Result<(), ChatError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.published.push((destination.to_string(), body));
            }
            Ok(())
        }

        fn deactivate(&mut self) {
            self.connected.store(false, Ordering::SeqCst);
            if let Ok(mut calls) = self.calls.lock() {
                calls.deactivated += 1;
            }
        }
    }

    impl TransportConnector for MockConnector {
        fn open(
            &self,
            params: ConnectParams,
            sink: EventSink,
        ) -> Result<Box<dyn TransportHandle>, ChatError> {
            let connected = Arc::new(AtomicBool::new(false));
            let Ok(mut clients) = self.clients.lock() else {
                return Err(ChatError::Transport("mock poisoned".to_string()));
            };
            clients.push(MockClient {
                params,
                sink,
                connected: Arc::clone(&connected),
            });
            Ok(Box::new(MockHandle {
                connected,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    impl MockConnector {
        fn opened(&self) -> usize {
            self.clients.lock().map(|c| c.len()).unwrap_or(0)
        }

        /// Completes the handshake of the latest client.
        fn accept(&self) {
            let Ok(clients) = self.clients.lock() else {
                panic!("mock poisoned");
            };
            let Some(client) = clients.last() else {
                panic!("no client opened");
            };
            client.connected.store(true, Ordering::SeqCst);
            client.sink.emit(TransportEvent::Connected);
        }

        /// Emits an event from the latest client.
        fn emit(&self, event: TransportEvent) {
            let Ok(clients) = self.clients.lock() else {
                panic!("mock poisoned");
            };
            let Some(client) = clients.last() else {
                panic!("no client opened");
            };
            if !matches!(event, TransportEvent::Message { .. }) {
                client.connected.store(false, Ordering::SeqCst);
            }
            client.sink.emit(event);
        }

        fn reject(&self) {
            self.emit(TransportEvent::StompError {
                message: "rejected".to_string(),
            });
        }

        fn last_params(&self) -> Option<ConnectParams> {
            self.clients
                .lock()
                .ok()
                .and_then(|c| c.last().map(|c| c.params.clone()))
        }

        fn calls<R>(&self, f: impl FnOnce(&Calls) -> R) -> R {
            let Ok(calls) = self.calls.lock() else {
                panic!("mock poisoned");
            };
            f(&calls)
        }
    }

    struct Harness {
        manager: ConnectionManager,
        connector: Arc<MockConnector>,
        credentials: Arc<MemoryCredentialStore>,
        notifications: broadcast::Receiver<Notification>,
    }

    fn harness() -> Harness {
        let connector = Arc::new(MockConnector::default());
        let credentials = Arc::new(MemoryCredentialStore::with_token("secret"));
        let bus = NotificationBus::new(32);
        let notifications = bus.subscribe();
        let manager = ConnectionManager::new(
            ChatConfig::default(),
            Arc::clone(&connector) as Arc<dyn TransportConnector>,
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            bus,
        );
        Harness {
            manager,
            connector,
            credentials,
            notifications,
        }
    }

    impl Harness {
        async fn connected(mut self) -> Self {
            self.manager.connect();
            self.connector.accept();
            self.manager.process_next().await;
            assert!(self.manager.is_connected());
            self
        }

        fn drain_notifications(&mut self) -> Vec<Notification> {
            let mut out = Vec::new();
            while let Ok(n) = self.notifications.try_recv() {
                out.push(n);
            }
            out
        }
    }

    type Inbox = Arc<Mutex<Vec<serde_json::Value>>>;

    fn recorder() -> (Inbox, MessageCallback) {
        let inbox: Inbox = Arc::default();
        let sink = Arc::clone(&inbox);
        let callback: MessageCallback = Arc::new(move |value| {
            if let Ok(mut messages) = sink.lock() {
                messages.push(value);
            }
        });
        (inbox, callback)
    }

    fn inbox_len(inbox: &Inbox) -> usize {
        inbox.lock().map(|m| m.len()).unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn successful_connect_resets_attempts() {
        let mut h = harness();
        h.manager.connect();
        assert_eq!(h.manager.connection_state(), ConnectionState::Connecting);

        h.connector.reject();
        h.manager.process_next().await;
        assert_eq!(h.manager.reconnect_attempts(), 1);

        h.manager.process_next().await;
        h.connector.accept();
        h.manager.process_next().await;

        assert!(h.manager.is_connected());
        assert_eq!(h.manager.reconnect_attempts(), 0);
        assert_eq!(h.manager.connection_state(), ConnectionState::Connected);
        assert!(
            h.drain_notifications()
                .iter()
                .any(|n| matches!(n, Notification::Connected { .. }))
        );
    }

    #[tokio::test]
    async fn connect_sends_bearer_token_and_timings() {
        let mut h = harness();
        h.manager.connect();
        let Some(params) = h.connector.last_params() else {
            panic!("expected a client");
        };
        assert_eq!(params.url, "ws://localhost:8080/ws");
        assert_eq!(
            params.connect_headers,
            vec![("Authorization".to_string(), "Bearer secret".to_string())]
        );
        assert_eq!(params.heartbeat, Heartbeat::from_millis(4000, 4000));
        assert_eq!(params.reconnect_delay, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn connect_while_connecting_or_connected_is_noop() {
        let mut h = harness();
        h.manager.connect();
        h.manager.connect();
        assert_eq!(h.connector.opened(), 1);

        h.connector.accept();
        h.manager.process_next().await;
        h.manager.connect();
        assert_eq!(h.connector.opened(), 1);
        assert_eq!(h.manager.connection_state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_is_bounded_with_fixed_delay() {
        let mut h = harness();
        h.manager.connect();

        for attempt in 1..=5_u32 {
            h.connector.reject();
            h.manager.process_next().await;
            assert_eq!(h.manager.reconnect_attempts(), attempt);
            assert!(h.manager.reconnect_pending());

            let started = Instant::now();
            h.manager.process_next().await;
            assert!(started.elapsed() >= Duration::from_millis(3000));
            assert_eq!(h.connector.opened() as u32, attempt + 1);
        }

        h.connector.reject();
        h.manager.process_next().await;
        assert_eq!(h.manager.reconnect_attempts(), 5);
        assert!(!h.manager.reconnect_pending());
        assert_eq!(h.connector.opened(), 6);

        let failures = h
            .drain_notifications()
            .into_iter()
            .filter(|n| matches!(n, Notification::ConnectionFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_connect_after_exhaustion_restores_budget() {
        let mut h = harness();
        h.credentials.set(None);
        h.manager.connect();
        for _ in 0..5 {
            h.manager.process_next().await;
        }
        assert_eq!(h.manager.reconnect_attempts(), 5);
        assert!(!h.manager.reconnect_pending());

        h.credentials.set(Some("fresh".to_string()));
        h.manager.connect();
        assert_eq!(h.manager.reconnect_attempts(), 0);
        assert_eq!(h.manager.connection_state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_schedules_reconnect() {
        let mut h = harness();
        h.credentials.set(None);
        h.manager.connect();

        assert_eq!(h.connector.opened(), 0);
        assert_eq!(h.manager.connection_state(), ConnectionState::Disconnected);
        assert_eq!(h.manager.reconnect_attempts(), 1);
        assert!(h.manager.reconnect_pending());

        h.credentials.set(Some("late".to_string()));
        h.manager.process_next().await;
        assert_eq!(h.connector.opened(), 1);
        let bearer = h
            .connector
            .last_params()
            .and_then(|p| p.connect_headers.first().map(|(_, v)| v.clone()));
        assert_eq!(bearer.as_deref(), Some("Bearer late"));
    }

    #[tokio::test]
    async fn subscribe_records_and_delivers() {
        let mut h = harness().connected().await;
        let (inbox, callback) = recorder();

        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(42), callback));
        assert!(h.manager.is_subscribed(RoomId::new(42)));
        assert_eq!(
            h.connector.calls(|c| c.subscribed.clone()),
            vec!["/topic/chat/room/42".to_string()]
        );

        h.connector.emit(TransportEvent::Message {
            destination: "/topic/chat/room/42".to_string(),
            body: r#"{"foo":1}"#.to_string(),
        });
        h.manager.process_next().await;

        let received = inbox.lock().map(|m| m.clone()).unwrap_or_default();
        assert_eq!(received, vec![serde_json::json!({"foo": 1})]);
    }

    #[tokio::test]
    async fn parse_failure_keeps_subscription() {
        let mut h = harness().connected().await;
        let (inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(1), callback));

        h.connector.emit(TransportEvent::Message {
            destination: "/topic/chat/room/1".to_string(),
            body: "not json".to_string(),
        });
        h.manager.process_next().await;
        assert_eq!(inbox_len(&inbox), 0);
        assert!(h.manager.is_subscribed(RoomId::new(1)));

        h.connector.emit(TransportEvent::Message {
            destination: "/topic/chat/room/1".to_string(),
            body: "[1,2]".to_string(),
        });
        h.manager.process_next().await;
        assert_eq!(inbox_len(&inbox), 1);
    }

    #[tokio::test]
    async fn message_for_other_room_is_not_delivered() {
        let mut h = harness().connected().await;
        let (inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(1), callback));

        h.connector.emit(TransportEvent::Message {
            destination: "/topic/chat/room/2".to_string(),
            body: "{}".to_string(),
        });
        h.manager.process_next().await;
        assert_eq!(inbox_len(&inbox), 0);
    }

    #[tokio::test]
    async fn non_canonical_destination_is_not_delivered() {
        let mut h = harness().connected().await;
        let (inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(42), callback));

        for destination in ["/topic/chat/room/+42", "/topic/chat/room/ 42", "/topic/chat/room/042"] {
            h.connector.emit(TransportEvent::Message {
                destination: destination.to_string(),
                body: "{}".to_string(),
            });
            h.manager.process_next().await;
        }
        assert_eq!(inbox_len(&inbox), 0);
    }

    #[tokio::test]
    async fn subscribe_while_disconnected_is_dropped() {
        let mut h = harness();
        let (_inbox, callback) = recorder();
        let result = h.manager.subscribe(RoomId::new(42), callback);
        assert!(matches!(result, Err(ChatError::NotConnected { .. })));
        assert_eq!(h.manager.subscription_count(), 0);
    }

    #[tokio::test]
    async fn send_message_publishes_payload() {
        let mut h = harness().connected().await;
        tokio_test::assert_ok!(
            h.manager
                .send_message(RoomId::new(42), OutboundMessage::text("hello"))
        );

        let published = h.connector.calls(|c| c.published.clone());
        let Some((destination, body)) = published.first() else {
            panic!("expected a publish");
        };
        assert_eq!(destination, "/app/chat.message");
        let value: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
        assert_eq!(
            value,
            serde_json::json!({"roomId": 42, "content": "hello", "messageType": "TEXT"})
        );
    }

    #[tokio::test]
    async fn send_message_while_disconnected_is_noop() {
        let mut h = harness();
        let result = h
            .manager
            .send_message(RoomId::new(42), OutboundMessage::text("lost"));
        assert!(matches!(result, Err(ChatError::NotConnected { .. })));
        assert!(h.connector.calls(|c| c.published.is_empty()));
    }

    #[tokio::test]
    async fn unsubscribe_uses_room_topic() {
        let mut h = harness().connected().await;
        let (_inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(9), callback));

        tokio_test::assert_ok!(h.manager.unsubscribe(RoomId::new(9)));
        assert!(!h.manager.is_subscribed(RoomId::new(9)));
        assert_eq!(
            h.connector.calls(|c| c.unsubscribed.clone()),
            vec!["/topic/chat/room/9".to_string()]
        );
    }

    #[tokio::test]
    async fn unsubscribe_while_disconnected_keeps_registration() {
        let mut h = harness().connected().await;
        let (_inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(9), callback));

        h.connector.emit(TransportEvent::Closed {
            reason: "network".to_string(),
        });
        h.manager.process_next().await;
        assert!(!h.manager.is_connected());

        tokio_test::assert_err!(h.manager.unsubscribe(RoomId::new(9)));
        assert!(h.manager.is_subscribed(RoomId::new(9)));
    }

    #[tokio::test]
    async fn disconnect_clears_subscriptions() {
        let mut h = harness().connected().await;
        let (_inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(42), Arc::clone(&callback)));

        h.manager.disconnect();
        assert!(!h.manager.is_connected());
        assert_eq!(h.manager.subscription_count(), 0);
        assert_eq!(h.connector.calls(|c| c.deactivated), 1);

        tokio_test::assert_err!(h.manager.subscribe(RoomId::new(42), callback));
        h.manager.disconnect();
        assert_eq!(h.manager.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let mut h = harness();
        h.manager.connect();
        h.connector.reject();
        h.manager.process_next().await;
        assert!(h.manager.reconnect_pending());

        h.manager.disconnect();
        assert!(!h.manager.reconnect_pending());

        let outcome = tokio::time::timeout(Duration::from_secs(10), h.manager.next_event()).await;
        assert!(outcome.is_err());
        assert_eq!(h.connector.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_reconnect_wait_forgets_rooms() {
        let mut h = harness().connected().await;
        let (_inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(42), callback));

        h.connector.reject();
        h.manager.process_next().await;
        assert!(h.manager.reconnect_pending());
        assert_eq!(h.manager.subscription_count(), 1);

        h.manager.disconnect();
        assert!(!h.manager.reconnect_pending());
        assert_eq!(h.manager.subscription_count(), 0);
        assert!(!h.manager.is_subscribed(RoomId::new(42)));

        h.manager.connect();
        h.connector.accept();
        h.manager.process_next().await;
        assert!(h.manager.is_connected());
        let subscribed = h.connector.calls(|c| c.subscribed.clone());
        assert_eq!(subscribed, vec!["/topic/chat/room/42".to_string()]);
    }

    #[derive(Debug)]
    struct RefusingConnector {
        error: fn() -> ChatError,
    }

    impl TransportConnector for RefusingConnector {
        fn open(
            &self,
            _params: ConnectParams,
            _sink: EventSink,
        ) -> Result<Box<dyn TransportHandle>, ChatError> {
            Err((self.error)())
        }
    }

    fn refusing_manager(error: fn() -> ChatError) -> ConnectionManager {
        ConnectionManager::new(
            ChatConfig::default(),
            Arc::new(RefusingConnector { error }),
            Arc::new(MemoryCredentialStore::with_token("secret")),
            NotificationBus::new(4),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transport_start_failure_is_retried() {
        let mut manager = refusing_manager(|| ChatError::Transport("no runtime".to_string()));
        manager.connect();
        assert!(manager.reconnect_pending());
        assert_eq!(manager.reconnect_attempts(), 1);
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn non_connection_error_stops_retrying() {
        let mut manager = refusing_manager(|| ChatError::Config("bad endpoint".to_string()));
        manager.connect();
        assert!(!manager.reconnect_pending());
        assert_eq!(manager.reconnect_attempts(), 0);
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);

        let outcome = tokio::time::timeout(Duration::from_secs(10), manager.next_event()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_connect_cancels_pending_reconnect() {
        let mut h = harness();
        h.manager.connect();
        h.connector.reject();
        h.manager.process_next().await;
        assert!(h.manager.reconnect_pending());

        h.manager.connect();
        assert!(!h.manager.reconnect_pending());
        assert_eq!(h.connector.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_replays_subscriptions_once() {
        let mut h = harness().connected().await;
        let (inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(42), callback));

        h.connector.emit(TransportEvent::StompError {
            message: "broker restarted".to_string(),
        });
        h.manager.process_next().await;
        assert!(!h.manager.is_connected());
        assert!(h.manager.reconnect_pending());

        let started = Instant::now();
        h.manager.process_next().await;
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(h.connector.opened(), 2);

        h.connector.accept();
        h.manager.process_next().await;
        assert!(h.manager.is_connected());
        assert_eq!(h.manager.subscription_count(), 1);
        assert_eq!(
            h.connector.calls(|c| c.subscribed.clone()),
            vec![
                "/topic/chat/room/42".to_string(),
                "/topic/chat/room/42".to_string()
            ]
        );

        h.connector.emit(TransportEvent::Message {
            destination: "/topic/chat/room/42".to_string(),
            body: r#"{"foo":1}"#.to_string(),
        });
        h.manager.process_next().await;
        assert_eq!(inbox_len(&inbox), 1);
    }

    #[tokio::test]
    async fn transport_level_reconnect_replays_subscriptions() {
        let mut h = harness().connected().await;
        let (_inbox, callback) = recorder();
        tokio_test::assert_ok!(h.manager.subscribe(RoomId::new(5), callback));

        h.connector.emit(TransportEvent::Closed {
            reason: "socket reset".to_string(),
        });
        h.manager.process_next().await;
        assert_eq!(h.manager.connection_state(), ConnectionState::Disconnected);
        assert!(!h.manager.reconnect_pending());

        h.connector.accept();
        h.manager.process_next().await;
        assert_eq!(h.connector.opened(), 1);
        assert_eq!(h.connector.calls(|c| c.subscribed.len()), 2);
    }

    #[tokio::test]
    async fn stale_client_events_are_ignored() {
        let mut h = harness();
        h.manager.connect();
        h.connector.reject();
        h.manager.process_next().await;

        // The rejected client was released; a late CONNECTED from it must
        // not flip the manager into Connected.
        h.connector.accept();
        h.manager.process_next().await;
        assert!(!h.manager.is_connected());
        assert_eq!(h.manager.reconnect_attempts(), 1);
    }

    #[tokio::test]
    async fn superseded_client_is_deactivated() {
        let mut h = harness();
        h.manager.connect();
        h.connector.emit(TransportEvent::Closed {
            reason: "refused".to_string(),
        });
        h.manager.process_next().await;
        assert_eq!(h.connector.calls(|c| c.deactivated), 1);

        h.manager.connect();
        assert_eq!(h.connector.opened(), 2);
    }
}
