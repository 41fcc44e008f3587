//! Event router — classifies inbound messages, validates their payloads,
//! and produces membership operations and outbound envelopes.
//!
//! Classification is pure: [`route`] returns a list of [`RouterAction`]s
//! for the hub to apply in order. Malformed messages yield an empty list
//! after a logged warning — no crash, no reply.

use serde_json::{Value, json};
use tracing::{debug, warn};

use agora_core::{AgoraError, ClientId, ClientMessage, Envelope, EventKind, RoomId};

/// One step the hub must apply for an inbound message.
#[derive(Debug)]
pub enum RouterAction {
    /// Add the sender to a room.
    Join(RoomId),
    /// Remove the sender from a room.
    Leave(RoomId),
    /// Fan an envelope out to a room, optionally excluding one identity.
    Broadcast {
        /// Target room.
        room: RoomId,
        /// Envelope to deliver.
        envelope: Envelope,
        /// Identity to skip (self-exclusion policy).
        exclude: Option<ClientId>,
    },
}

/// Classify an inbound message from `identity` into hub actions.
/// Malformed messages are warn-logged and yield no actions.
pub fn route(identity: &ClientId, msg: &ClientMessage) -> Vec<RouterAction> {
    match try_route(identity, msg) {
        Ok(actions) => actions,
        Err(err) => {
            warn!(identity = %identity, error = %err, "message dropped");
            Vec::new()
        }
    }
}

/// Classify an inbound message, surfacing validation failures.
///
/// # Errors
///
/// Returns [`AgoraError::Malformed`] when the payload is missing a
/// required field, carries a bad value, or uses a server-only kind.
pub fn try_route(
    identity: &ClientId,
    msg: &ClientMessage,
) -> Result<Vec<RouterAction>, AgoraError> {
    match msg.kind {
        EventKind::JoinRoom => route_join(identity, &msg.data),
        EventKind::LeaveRoom => route_leave(identity, &msg.data),
        EventKind::Vote => route_vote(identity, &msg.data),
        EventKind::Comment => route_comment(identity, &msg.data),
        EventKind::QuorumReached => route_quorum(identity, &msg.data),
        EventKind::MarkRead | EventKind::MarkAllRead => {
            // Book-keeping only; no acknowledgement is sent.
            debug!(identity = %identity, kind = %msg.kind, "read-state update");
            Ok(Vec::new())
        }
        // Server-originated kinds are not routable when sent by a client.
        EventKind::Welcome
        | EventKind::Notification
        | EventKind::UserJoined
        | EventKind::UserLeft => Err(AgoraError::malformed(
            msg.kind.as_str(),
            "server-only kind sent by a client",
        )),
    }
}

fn route_join(identity: &ClientId, data: &Value) -> Result<Vec<RouterAction>, AgoraError> {
    let room = required_str(data, "roomId", EventKind::JoinRoom)?;
    let room = RoomId::from(room);
    let presence = Envelope::new(
        EventKind::UserJoined,
        json!({ "userId": identity.as_str(), "roomId": room.as_str() }),
    )
    .with_source(identity.clone());
    Ok(vec![
        RouterAction::Join(room.clone()),
        RouterAction::Broadcast {
            room,
            envelope: presence,
            exclude: Some(identity.clone()),
        },
    ])
}

fn route_leave(identity: &ClientId, data: &Value) -> Result<Vec<RouterAction>, AgoraError> {
    let room = required_str(data, "roomId", EventKind::LeaveRoom)?;
    let room = RoomId::from(room);
    let presence = Envelope::new(
        EventKind::UserLeft,
        json!({ "userId": identity.as_str(), "roomId": room.as_str() }),
    )
    .with_source(identity.clone());
    // Leave first so the departing member is not a recipient; the exclude
    // guards the case where the sender was never a member.
    Ok(vec![
        RouterAction::Leave(room.clone()),
        RouterAction::Broadcast {
            room,
            envelope: presence,
            exclude: Some(identity.clone()),
        },
    ])
}

fn route_vote(identity: &ClientId, data: &Value) -> Result<Vec<RouterAction>, AgoraError> {
    let entity_id = required_str(data, "entityId", EventKind::Vote)?;
    let choice = required_str(data, "choice", EventKind::Vote)?;
    if !matches!(choice.as_str(), "for" | "against" | "abstain") {
        return Err(AgoraError::malformed(
            EventKind::Vote.as_str(),
            format!("unrecognized choice '{choice}'"),
        ));
    }
    if data.get("weight").and_then(Value::as_f64).is_none() {
        return Err(AgoraError::malformed(
            EventKind::Vote.as_str(),
            "missing numeric weight",
        ));
    }

    // The vote itself goes to the entity room, sender included — every
    // viewer's tally must move, the caster's too.
    let mut vote_data = data.clone();
    vote_data["userId"] = json!(identity.as_str());
    let vote = Envelope::new(EventKind::Vote, vote_data)
        .with_source(identity.clone())
        .with_entity(entity_id.clone());

    // A derived notification fans out globally, excluding the caster.
    let notification = Envelope::new(
        EventKind::Notification,
        json!({
            "id": format!(
                "vote-{entity_id}-{identity}-{}",
                vote.emitted_at.timestamp_millis()
            ),
            "kind": "vote",
            "title": "New Vote Cast",
            "message": format!("{identity} voted {}", choice.to_uppercase()),
            "entityId": entity_id,
            "priority": "medium",
        }),
    )
    .with_source(identity.clone())
    .with_entity(entity_id.clone());

    Ok(vec![
        RouterAction::Broadcast {
            room: RoomId::proposal(&entity_id),
            envelope: vote,
            exclude: None,
        },
        RouterAction::Broadcast {
            room: RoomId::global(),
            envelope: notification,
            exclude: Some(identity.clone()),
        },
    ])
}

fn route_comment(identity: &ClientId, data: &Value) -> Result<Vec<RouterAction>, AgoraError> {
    let entity_id = required_str(data, "entityId", EventKind::Comment)?;
    let _comment_id = required_str(data, "commentId", EventKind::Comment)?;
    let _body = required_str(data, "body", EventKind::Comment)?;

    let mut comment_data = data.clone();
    comment_data["userId"] = json!(identity.as_str());
    let comment = Envelope::new(EventKind::Comment, comment_data)
        .with_source(identity.clone())
        .with_entity(entity_id.clone());

    Ok(vec![RouterAction::Broadcast {
        room: RoomId::proposal(&entity_id),
        envelope: comment,
        exclude: None,
    }])
}

fn route_quorum(identity: &ClientId, data: &Value) -> Result<Vec<RouterAction>, AgoraError> {
    let entity_id = required_str(data, "entityId", EventKind::QuorumReached)?;
    if data.get("quorumPct").and_then(Value::as_f64).is_none() {
        return Err(AgoraError::malformed(
            EventKind::QuorumReached.as_str(),
            "missing numeric quorumPct",
        ));
    }

    // Multiple observing clients may announce the same transition;
    // client tallies latch on the first announcement per entity, so
    // duplicates are absorbed downstream.
    let envelope = Envelope::new(EventKind::QuorumReached, data.clone())
        .with_source(identity.clone())
        .with_entity(entity_id);

    Ok(vec![RouterAction::Broadcast {
        room: RoomId::global(),
        envelope,
        exclude: None,
    }])
}

fn required_str(data: &Value, field: &str, kind: EventKind) -> Result<String, AgoraError> {
    match data.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_owned()),
        _ => Err(AgoraError::malformed(
            kind.as_str(),
            format!("missing required field {field}"),
        )),
    }
}
