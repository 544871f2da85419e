//! # chat-link
//!
//! Real-time chat connection manager for the marketplace chat backend.
//!
//! The crate keeps one STOMP-over-WebSocket session to the backend, tracks
//! per-room topic subscriptions, retries failed handshakes a bounded number
//! of times with a fixed delay, and replays every subscription after a
//! reconnect. The wire protocol lives behind a transport trait so the
//! connection policy can be exercised without a network.
//!
//! ## Architecture
//!
//! ```text
//! Presentation (main.rs / embedding UI)
//!     │
//!     ├── AppState (app_state)
//!     │
//!     ├── ConnectionManager (service/)
//!     │     ├── SubscriptionRegistry
//!     │     ├── CredentialStore (credentials)
//!     │     └── NotificationBus (domain/)
//!     │
//!     ├── Transport seam (transport)
//!     │
//!     └── WsStompConnector (ws/) ── STOMP codec (stomp/)
//! ```

pub mod app_state;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod service;
pub mod stomp;
pub mod transport;
pub mod ws;
