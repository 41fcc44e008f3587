//! Connection registry — one live connection per identity.
//!
//! Owned exclusively by the hub actor task; all access happens from the
//! single message-processing path, so a plain `HashMap` suffices.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use agora_core::{ClientId, Envelope};

use crate::connection::HubConnection;

/// Outcome of a single-target send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued to the member's write task.
    Delivered,
    /// Identity absent or connection not open — a no-op, not an error.
    Skipped,
    /// Write failed; the caller must treat the member as disconnected.
    Failed,
}

/// Registry of live connections, keyed by identity.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, Arc<HubConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, superseding any existing one for the same
    /// identity. The superseded connection's socket tasks are cancelled.
    /// Always succeeds.
    pub fn register(&mut self, conn: Arc<HubConnection>) {
        conn.open();
        if let Some(old) = self.connections.insert(conn.identity.clone(), conn) {
            debug!(identity = %old.identity, "superseding existing connection");
            old.supersede();
        }
    }

    /// Remove the entry for an identity. Idempotent.
    pub fn unregister(&mut self, identity: &ClientId) -> Option<Arc<HubConnection>> {
        self.connections.remove(identity)
    }

    /// Whether this exact connection (pointer identity) is the one
    /// registered for its identity. Guards the disconnect cascade against
    /// tearing down a superseding connection.
    #[must_use]
    pub fn is_registered(&self, conn: &Arc<HubConnection>) -> bool {
        self.connections
            .get(&conn.identity)
            .is_some_and(|current| Arc::ptr_eq(current, conn))
    }

    /// Serialize and send an envelope to one identity.
    ///
    /// Never returns an error to the caller; a write failure is reported
    /// as [`SendOutcome::Failed`] so the hub can run the disconnect
    /// cascade.
    pub fn send_to(&self, identity: &ClientId, envelope: &Envelope) -> SendOutcome {
        let json = match serde_json::to_string(envelope) {
            Ok(j) => j,
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "failed to serialize envelope");
                return SendOutcome::Skipped;
            }
        };
        self.send_raw(identity, &Arc::new(json))
    }

    /// Send pre-serialized text to one identity.
    pub fn send_raw(&self, identity: &ClientId, json: &Arc<String>) -> SendOutcome {
        match self.connections.get(identity) {
            None => SendOutcome::Skipped,
            Some(conn) if !conn.is_open() => SendOutcome::Skipped,
            Some(conn) => {
                if conn.send(Arc::clone(json)) {
                    SendOutcome::Delivered
                } else {
                    warn!(identity = %identity, "send failed, treating member as disconnected");
                    SendOutcome::Failed
                }
            }
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Visit every registered connection.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<HubConnection>)) {
        for conn in self.connections.values() {
            f(conn);
        }
    }
}
