//! Client error types with stable numeric codes.
//!
//! [`ChatError`] is the central error type for the crate. None of these
//! conditions is fatal to the process: connection-level failures feed the
//! reconnect policy, everything else is logged at the call site and the
//! operation becomes a no-op.

/// Client-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category        | Handling                          |
/// |-----------|-----------------|-----------------------------------|
/// | 1000–1999 | Connection      | Funnelled into the reconnect policy |
/// | 2000–2999 | Usage/State     | Logged, call is a no-op           |
/// | 3000–3999 | Data            | Logged, message dropped           |
/// | 4000–4999 | Setup           | Surfaced at startup               |
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// No token was found in the credential store.
    #[error("missing credential: no token in credential store")]
    MissingCredential,

    /// The STOMP handshake was rejected or the socket closed before
    /// `CONNECTED` arrived.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Underlying WebSocket or transport task failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation that requires a live connection was attempted while
    /// disconnected.
    #[error("not connected: cannot {operation}")]
    NotConnected {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// An inbound message body was not valid JSON.
    #[error("failed to parse message on {destination}: {source}")]
    Parse {
        /// Destination the message arrived on.
        destination: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An outbound payload could not be serialised.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// A STOMP frame could not be decoded.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Credential store could not be read or written.
    #[error("credential store error: {0}")]
    Credential(String),
}

impl ChatError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MissingCredential => 1001,
            Self::Handshake(_) => 1002,
            Self::Transport(_) => 1003,
            Self::NotConnected { .. } => 2001,
            Self::Parse { .. } => 3001,
            Self::Encode(_) => 3002,
            Self::Frame(_) => 3003,
            Self::Config(_) => 4001,
            Self::Credential(_) => 4002,
        }
    }

    /// Returns `true` if the error is connection-level and should trigger
    /// the reconnect policy.
    #[must_use]
    pub const fn is_reconnectable(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential | Self::Handshake(_) | Self::Transport(_)
        )
    }
}
