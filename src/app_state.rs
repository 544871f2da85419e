//! Composition root: wires one [`ConnectionManager`] from configuration.
//!
//! The application builds a single `AppState` at startup and hands the
//! manager to its presentation layer; there is no process-wide static.

use std::sync::Arc;

use crate::config::ChatConfig;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::domain::NotificationBus;
use crate::service::ConnectionManager;
use crate::ws::WsStompConnector;

/// Application state owned by the top-level task.
#[derive(Debug)]
pub struct AppState {
    /// The chat connection manager.
    pub manager: ConnectionManager,
    /// Bus for user-visible notifications.
    pub notifications: NotificationBus,
    /// Persisted credential store the manager reads tokens from.
    pub credentials: Arc<FileCredentialStore>,
}

impl AppState {
    /// Builds the production stack: file-backed credentials and the
    /// WebSocket STOMP transport.
    #[must_use]
    pub fn from_config(config: ChatConfig) -> Self {
        let notifications = NotificationBus::new(config.notification_capacity);
        let credentials = Arc::new(FileCredentialStore::new(
            config.credential_path.clone(),
            config.credential_key.clone(),
        ));
        let manager = ConnectionManager::new(
            config,
            Arc::new(WsStompConnector::new()),
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            notifications.clone(),
        );
        Self {
            manager,
            notifications,
            credentials,
        }
    }
}
