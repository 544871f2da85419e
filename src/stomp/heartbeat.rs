//! STOMP heart-beat negotiation.
//!
//! The `heart-beat` header carries `outgoing,incoming` in milliseconds from
//! the sender's point of view; `0` disables that direction.

use std::time::Duration;

/// Heart-beat intervals in both directions. Zero means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// Interval at which this side sends beats.
    pub outgoing: Duration,
    /// Interval at which this side expects beats from the peer.
    pub incoming: Duration,
}

impl Heartbeat {
    /// Builds a heart-beat from millisecond values.
    #[must_use]
    pub const fn from_millis(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self {
            outgoing: Duration::from_millis(outgoing_ms),
            incoming: Duration::from_millis(incoming_ms),
        }
    }

    /// Value for the `heart-beat` header, e.g. `"4000,4000"`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Parses a `heart-beat` header value. Returns `None` if malformed.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (out, inc) = value.split_once(',')?;
        Some(Self::from_millis(
            out.trim().parse().ok()?,
            inc.trim().parse().ok()?,
        ))
    }

    /// Resolves the intervals this client must honour given the server's
    /// advertised heart-beat.
    ///
    /// Each direction is enabled only if both sides want it, and runs at the
    /// slower of the two requested rates.
    #[must_use]
    pub fn negotiate(&self, server: Self) -> Self {
        Self {
            outgoing: pick(self.outgoing, server.incoming),
            incoming: pick(self.incoming, server.outgoing),
        }
    }

    /// Outgoing interval, or `None` when disabled.
    #[must_use]
    pub fn send_interval(&self) -> Option<Duration> {
        (!self.outgoing.is_zero()).then_some(self.outgoing)
    }

    /// Maximum tolerated silence from the peer (twice the incoming
    /// interval), or `None` when disabled.
    #[must_use]
    pub fn receive_timeout(&self) -> Option<Duration> {
        (!self.incoming.is_zero()).then(|| self.incoming.saturating_mul(2))
    }
}

fn pick(ours: Duration, theirs: Duration) -> Duration {
    if ours.is_zero() || theirs.is_zero() {
        Duration::ZERO
    } else {
        ours.max(theirs)
    }
}
