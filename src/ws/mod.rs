//! WebSocket transport: STOMP sessions over `tokio-tungstenite`.
//!
//! [`WsStompConnector`] is the production
//! [`TransportConnector`](crate::transport::TransportConnector). Each client
//! runs as its own task and talks to the manager only through its handle
//! and event sink.

pub mod client;
mod connection;

pub use client::{WsStompConnector, WsStompHandle};
