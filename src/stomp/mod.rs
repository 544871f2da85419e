//! STOMP 1.2 codec: frames and heart-beat negotiation.
//!
//! Only the client-side subset needed by the chat transport is covered;
//! transactions, acknowledgements and receipts are not issued.

pub mod frame;
pub mod heartbeat;

pub use frame::{Command, Frame, split_frames};
pub use heartbeat::Heartbeat;
