//! Namespaced room identifiers.
//!
//! Rooms come in three shapes: the `global` feed, a bare topic channel
//! (`proposal`), and a per-entity room (`proposal:42`). The raw string is
//! the wire representation; rooms themselves exist only as membership sets
//! inside the hub and are created lazily on first join.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Topic name used for per-proposal entity rooms.
pub const PROPOSAL_TOPIC: &str = "proposal";

/// Identifier of a broadcast room.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// The `global` feed every connected client may subscribe to.
    #[must_use]
    pub fn global() -> Self {
        Self("global".to_owned())
    }

    /// A bare topic channel, e.g. `proposal`.
    #[must_use]
    pub fn topic(name: &str) -> Self {
        Self(name.to_owned())
    }

    /// A per-entity room, e.g. `proposal:42`.
    #[must_use]
    pub fn entity(topic: &str, entity_id: &str) -> Self {
        Self(format!("{topic}:{entity_id}"))
    }

    /// The per-proposal room for an entity ID.
    #[must_use]
    pub fn proposal(entity_id: &str) -> Self {
        Self::entity(PROPOSAL_TOPIC, entity_id)
    }

    /// Whether this is the global feed.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0 == "global"
    }

    /// The entity ID, when this is a `<topic>:<entity>` room.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, id)| id)
    }

    /// Raw room string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_room_string() {
        assert_eq!(RoomId::global().as_str(), "global");
        assert!(RoomId::global().is_global());
    }

    #[test]
    fn entity_room_format() {
        let room = RoomId::proposal("42");
        assert_eq!(room.as_str(), "proposal:42");
        assert!(!room.is_global());
    }

    #[test]
    fn entity_id_extraction() {
        assert_eq!(RoomId::proposal("42").entity_id(), Some("42"));
        assert_eq!(RoomId::topic("proposal").entity_id(), None);
        assert_eq!(RoomId::global().entity_id(), None);
    }

    #[test]
    fn from_raw_string_round_trips() {
        let room = RoomId::from("proposal:7");
        assert_eq!(room, RoomId::proposal("7"));
        assert_eq!(room.to_string(), "proposal:7");
    }

    #[test]
    fn serde_is_transparent() {
        let room = RoomId::proposal("9");
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(json, "\"proposal:9\"");
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, room);
    }

    #[test]
    fn entity_id_with_colon_in_id() {
        // Only the first colon splits topic from entity.
        let room = RoomId::from("proposal:a:b");
        assert_eq!(room.entity_id(), Some("a:b"));
    }
}
