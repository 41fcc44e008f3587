//! Room membership and broadcast fan-out.
//!
//! Rooms are created lazily on first join and deleted when the last member
//! leaves. Membership is in-memory only and lost on restart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use agora_core::{ClientId, Envelope, RoomId};

use crate::registry::{ConnectionRegistry, SendOutcome};

/// Membership sets per room, owned by the hub actor.
#[derive(Default)]
pub struct RoomManager {
    rooms: HashMap<RoomId, HashSet<ClientId>>,
}

impl RoomManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity to a room (idempotent). Returns the member count
    /// after the join.
    pub fn join(&mut self, room: &RoomId, identity: &ClientId) -> usize {
        let members = self.rooms.entry(room.clone()).or_default();
        let _ = members.insert(identity.clone());
        members.len()
    }

    /// Remove an identity from a room (idempotent). Deletes the room when
    /// it becomes empty.
    pub fn leave(&mut self, room: &RoomId, identity: &ClientId) {
        if let Some(members) = self.rooms.get_mut(room) {
            let _ = members.remove(identity);
            if members.is_empty() {
                let _ = self.rooms.remove(room);
                debug!(room = %room, "room empty, removed");
            }
        }
    }

    /// Remove an identity from every room it belongs to. Returns the rooms
    /// it was a member of, for presence broadcasts on disconnect.
    pub fn leave_all(&mut self, identity: &ClientId) -> Vec<RoomId> {
        let joined: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, members)| members.contains(identity))
            .map(|(room, _)| room.clone())
            .collect();
        for room in &joined {
            self.leave(room, identity);
        }
        joined
    }

    /// Member count for a room; 0 for an unknown room, never an error.
    #[must_use]
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Whether an identity is a member of a room.
    #[must_use]
    pub fn is_member(&self, room: &RoomId, identity: &ClientId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(identity))
    }

    /// Number of live (non-empty) rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Deliver an envelope to every current member of a room except
    /// `exclude`, serializing once.
    ///
    /// Members whose send fails are returned so the hub can run the
    /// disconnect cascade; failure is never surfaced to the broadcaster.
    pub fn broadcast(
        &self,
        registry: &ConnectionRegistry,
        room: &RoomId,
        envelope: &Envelope,
        exclude: Option<&ClientId>,
    ) -> Vec<ClientId> {
        let Some(members) = self.rooms.get(room) else {
            return Vec::new();
        };
        let json = match serde_json::to_string(envelope) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "failed to serialize envelope");
                return Vec::new();
            }
        };

        let mut failed = Vec::new();
        for member in members {
            if exclude == Some(member) {
                continue;
            }
            if registry.send_raw(member, &json) == SendOutcome::Failed {
                failed.push(member.clone());
            }
        }
        debug!(
            room = %room,
            kind = %envelope.kind,
            recipients = members.len(),
            failed = failed.len(),
            "broadcast"
        );
        failed
    }
}
