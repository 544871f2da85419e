//! Service layer: the connection manager and its subscription registry.

pub mod connection_manager;
pub mod subscription_registry;

pub use connection_manager::{ConnectionManager, ConnectionState};
pub use subscription_registry::{MessageCallback, SubscriptionRegistry};
