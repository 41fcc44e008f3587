//! Outbound send seam.
//!
//! Feed state machines emit messages through this trait rather than a
//! concrete session, which keeps them testable with a recording fake.

use serde_json::Value;

use agora_core::EventKind;

use crate::session::ClientSession;

/// Fire-and-forget sender toward the hub.
pub trait OutboundSink: Send + Sync {
    /// Send a message. Returns `false` when it was dropped.
    fn send(&self, kind: EventKind, data: Value) -> bool;
}

impl OutboundSink for ClientSession {
    fn send(&self, kind: EventKind, data: Value) -> bool {
        ClientSession::send(self, kind, data)
    }
}
