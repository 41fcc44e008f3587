//! Event kinds and the wire envelope.
//!
//! [`ClientMessage`] is the inbound unit (`{kind, data}`); the hub never
//! trusts a client-supplied timestamp. [`Envelope`] is the outbound unit —
//! immutable once constructed, with `emittedAt` set from server-observed
//! time so ordering is not subject to client clock skew.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgoraError;
use crate::ids::ClientId;
use crate::room::{PROPOSAL_TOPIC, RoomId};

/// Closed set of event kinds carried on the wire.
///
/// Unknown kinds fail deserialization, which the hub treats as a malformed
/// message (dropped with a warning, no reply).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Hub greeting sent once per accepted connection.
    Welcome,
    /// Client requests membership in a room (`data.roomId`).
    JoinRoom,
    /// Client leaves a room (`data.roomId`).
    LeaveRoom,
    /// A vote was cast (`data: {entityId, choice, weight, reason?}`).
    Vote,
    /// A comment was added (`data: {entityId, commentId, body}`).
    Comment,
    /// Quorum crossed the configured threshold (`data: {entityId, quorumPct}`).
    QuorumReached,
    /// Client marked one notification read (`data.notificationId`).
    MarkRead,
    /// Client marked all notifications read.
    MarkAllRead,
    /// Generic system-originated notification payload.
    Notification,
    /// Presence: an identity joined a room.
    UserJoined,
    /// Presence: an identity left a room.
    UserLeft,
}

impl EventKind {
    /// Wire tag, also used as a subscription channel key.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::JoinRoom => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::Vote => "vote",
            Self::Comment => "comment",
            Self::QuorumReached => "quorum-reached",
            Self::MarkRead => "mark-read",
            Self::MarkAllRead => "mark-all-read",
            Self::Notification => "notification",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound message from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Event kind tag.
    pub kind: EventKind,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl ClientMessage {
    /// Build an inbound message.
    #[must_use]
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self { kind, data }
    }

    /// Parse one wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`AgoraError::Serialization`] when the frame is not valid
    /// JSON or carries an unknown kind tag.
    pub fn parse(text: &str) -> Result<Self, AgoraError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Outbound event envelope.
///
/// Immutable once constructed; the router never mutates a payload after
/// broadcast.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Event kind tag.
    pub kind: EventKind,
    /// Kind-specific payload.
    pub data: Value,
    /// Server-observed construction time.
    pub emitted_at: DateTime<Utc>,
    /// Identity whose action produced this envelope, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<ClientId>,
    /// Entity this envelope concerns, when scoped to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Envelope {
    /// Construct an envelope stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            data,
            emitted_at: Utc::now(),
            source_id: None,
            entity_id: None,
        }
    }

    /// Attach the acting identity.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<ClientId>) -> Self {
        self.source_id = Some(source.into());
        self
    }

    /// Attach the entity this envelope concerns.
    #[must_use]
    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// The per-entity room this envelope belongs to, when scoped.
    #[must_use]
    pub fn entity_room(&self) -> Option<RoomId> {
        self.entity_id
            .as_deref()
            .map(|id| RoomId::entity(PROPOSAL_TOPIC, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_tags_are_kebab_case() {
        let json = serde_json::to_string(&EventKind::QuorumReached).unwrap();
        assert_eq!(json, "\"quorum-reached\"");
        let json = serde_json::to_string(&EventKind::JoinRoom).unwrap();
        assert_eq!(json, "\"join-room\"");
    }

    #[test]
    fn kind_as_str_matches_serde() {
        for kind in [
            EventKind::Welcome,
            EventKind::JoinRoom,
            EventKind::LeaveRoom,
            EventKind::Vote,
            EventKind::Comment,
            EventKind::QuorumReached,
            EventKind::MarkRead,
            EventKind::MarkAllRead,
            EventKind::Notification,
            EventKind::UserJoined,
            EventKind::UserLeft,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let result = ClientMessage::parse(r#"{"kind":"proposal-update","data":{}}"#);
        assert!(matches!(result, Err(AgoraError::Serialization(_))));
    }

    #[test]
    fn client_message_data_defaults_to_null() {
        let msg: ClientMessage = serde_json::from_str(r#"{"kind":"mark-all-read"}"#).unwrap();
        assert_eq!(msg.kind, EventKind::MarkAllRead);
        assert!(msg.data.is_null());
    }

    #[test]
    fn envelope_wire_fields_are_camel_case() {
        let env = Envelope::new(EventKind::Vote, json!({"choice": "for"}))
            .with_source(ClientId::from("alice"))
            .with_entity("42");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["kind"], "vote");
        assert_eq!(value["sourceId"], "alice");
        assert_eq!(value["entityId"], "42");
        assert!(value["emittedAt"].is_string());
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let env = Envelope::new(EventKind::Notification, json!({"title": "t"}));
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("sourceId").is_none());
        assert!(value.get("entityId").is_none());
    }

    #[test]
    fn envelope_round_trips() {
        let env = Envelope::new(EventKind::Comment, json!({"body": "hi"})).with_entity("7");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EventKind::Comment);
        assert_eq!(back.entity_id.as_deref(), Some("7"));
        assert_eq!(back.emitted_at, env.emitted_at);
    }

    #[test]
    fn entity_room_derivation() {
        let env = Envelope::new(EventKind::Vote, json!({})).with_entity("42");
        assert_eq!(env.entity_room(), Some(RoomId::proposal("42")));

        let env = Envelope::new(EventKind::Notification, json!({}));
        assert_eq!(env.entity_room(), None);
    }
}
