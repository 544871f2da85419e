//! Type-safe chat room identifier.
//!
//! [`RoomId`] is a newtype wrapper around the backend's numeric room key so
//! that room identifiers cannot be confused with message or product ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a chat room.
///
/// Assigned by the backend when the room is created. Used to derive the
/// room's inbound topic and as the `roomId` field of outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(i64);

impl RoomId {
    /// Wraps a raw numeric room id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<i64> for RoomId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RoomId> for i64 {
    fn from(id: RoomId) -> Self {
        id.0
    }
}
