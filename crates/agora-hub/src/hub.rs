//! Hub actor — the single task that owns all connection and room state.
//!
//! Commands arrive on one bounded queue and are processed to completion,
//! fan-out included, before the next command is taken. That sequencing is
//! what gives every room member the same delivery order for any pair of
//! events published to the same room.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use agora_core::{ClientId, ClientMessage, Envelope, EventKind, RoomId};

use crate::connection::HubConnection;
use crate::metrics::{
    HUB_CONNECTIONS_ACTIVE, HUB_CONNECTIONS_TOTAL, HUB_DISCONNECTIONS_TOTAL,
    HUB_MALFORMED_TOTAL, HUB_MESSAGES_TOTAL, HUB_ROOMS_ACTIVE,
};
use crate::registry::{ConnectionRegistry, SendOutcome};
use crate::rooms::RoomManager;
use crate::router::{self, RouterAction};

/// Queue depth for the hub command channel.
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// A unit of work for the hub actor.
pub enum HubCommand {
    /// A newly accepted connection, ready to register.
    Attach(Arc<HubConnection>),
    /// A text frame received from a connected client.
    Inbound {
        /// Authenticated sender.
        identity: ClientId,
        /// Raw frame payload.
        text: String,
    },
    /// A connection's socket task ended; tear it down if still current.
    Detach(Arc<HubConnection>),
    /// Server-originated envelope for a room (system ticker, admin pushes).
    Publish {
        /// Target room.
        room: RoomId,
        /// Envelope to deliver.
        envelope: Envelope,
    },
}

/// Live counters exported to `/health`.
#[derive(Default)]
pub struct HubStats {
    connections: AtomicUsize,
    rooms: AtomicUsize,
}

impl HubStats {
    /// Registered connection count.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Live room count.
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }
}

/// Cheap handle for submitting commands to the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    stats: Arc<HubStats>,
}

impl HubHandle {
    /// Submit a command, waiting for queue space.
    ///
    /// Fails only when the hub task has exited.
    pub async fn submit(&self, cmd: HubCommand) -> Result<(), mpsc::error::SendError<HubCommand>> {
        self.tx.send(cmd).await
    }

    /// Shared live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<HubStats> {
        Arc::clone(&self.stats)
    }
}

/// The hub actor. Construct with [`Hub::new`], then drive with
/// [`Hub::run`] on its own task.
pub struct Hub {
    registry: ConnectionRegistry,
    rooms: RoomManager,
    rx: mpsc::Receiver<HubCommand>,
    cancel: CancellationToken,
    stats: Arc<HubStats>,
}

impl Hub {
    /// Create a hub and the handle used to feed it.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let stats = Arc::new(HubStats::default());
        let hub = Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomManager::new(),
            rx,
            cancel,
            stats: Arc::clone(&stats),
        };
        (hub, HubHandle { tx, stats })
    }

    /// Drain the command queue until cancelled, then close every
    /// remaining connection.
    pub async fn run(mut self) {
        info!("hub started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }

        let remaining = self.registry.connection_count();
        for identity in self.registered_identities() {
            self.disconnect(identity);
        }
        info!(connections = remaining, "hub stopped");
    }

    fn registered_identities(&self) -> Vec<ClientId> {
        let mut ids = Vec::with_capacity(self.registry.connection_count());
        self.registry.for_each(|conn| ids.push(conn.identity.clone()));
        ids
    }

    /// Apply one command. Synchronous on purpose: by the time this
    /// returns, every effect of the command is visible.
    pub fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Attach(conn) => self.attach(conn),
            HubCommand::Inbound { identity, text } => self.inbound(&identity, &text),
            HubCommand::Detach(conn) => self.detach(&conn),
            HubCommand::Publish { room, envelope } => {
                let failed = self.rooms.broadcast(&self.registry, &room, &envelope, None);
                self.disconnect_all(failed);
            }
        }
        self.publish_stats();
    }

    fn attach(&mut self, conn: Arc<HubConnection>) {
        let identity = conn.identity.clone();
        self.registry.register(conn);
        counter!(HUB_CONNECTIONS_TOTAL).increment(1);
        info!(identity = %identity, "client attached");

        let welcome = Envelope::new(
            EventKind::Welcome,
            json!({
                "userId": identity.as_str(),
                "message": "Connected to governance hub",
            }),
        );
        if self.registry.send_to(&identity, &welcome) == SendOutcome::Failed {
            self.disconnect(identity);
        }
    }

    fn inbound(&mut self, identity: &ClientId, text: &str) {
        let msg = match ClientMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                counter!(HUB_MALFORMED_TOTAL).increment(1);
                warn!(identity = %identity, error = %e, "unparseable frame, dropped");
                return;
            }
        };
        counter!(HUB_MESSAGES_TOTAL, "kind" => msg.kind.as_str()).increment(1);

        let mut failed = Vec::new();
        for action in router::route(identity, &msg) {
            match action {
                RouterAction::Join(room) => {
                    let count = self.rooms.join(&room, identity);
                    debug!(identity = %identity, room = %room, members = count, "joined room");
                }
                RouterAction::Leave(room) => {
                    self.rooms.leave(&room, identity);
                    debug!(identity = %identity, room = %room, "left room");
                }
                RouterAction::Broadcast { room, envelope, exclude } => {
                    failed.extend(self.rooms.broadcast(
                        &self.registry,
                        &room,
                        &envelope,
                        exclude.as_ref(),
                    ));
                }
            }
        }
        self.disconnect_all(failed);
    }

    fn detach(&mut self, conn: &Arc<HubConnection>) {
        // A superseded connection's teardown must not touch its
        // replacement; pointer identity decides.
        if self.registry.is_registered(conn) {
            self.disconnect(conn.identity.clone());
        } else {
            conn.close();
            debug!(identity = %conn.identity, "stale detach ignored");
        }
    }

    fn disconnect_all(&mut self, identities: Vec<ClientId>) {
        for identity in identities {
            self.disconnect(identity);
        }
    }

    /// Tear down one identity: unregister, leave every room, and announce
    /// the departure to each room it was in.
    ///
    /// Departure broadcasts can themselves expose dead members, so the
    /// cascade runs as a worklist rather than recursing.
    fn disconnect(&mut self, identity: ClientId) {
        let mut worklist = vec![identity];
        while let Some(identity) = worklist.pop() {
            let Some(conn) = self.registry.unregister(&identity) else {
                continue;
            };
            conn.supersede();
            conn.close();
            counter!(HUB_DISCONNECTIONS_TOTAL).increment(1);
            info!(
                identity = %identity,
                connected_for = ?conn.connected_at.elapsed(),
                dropped = conn.drop_count(),
                "client detached"
            );

            for room in self.rooms.leave_all(&identity) {
                let departure = Envelope::new(
                    EventKind::UserLeft,
                    json!({ "userId": identity.as_str(), "roomId": room.as_str() }),
                )
                .with_source(identity.clone());
                worklist.extend(self.rooms.broadcast(
                    &self.registry,
                    &room,
                    &departure,
                    Some(&identity),
                ));
            }
        }
    }

    fn publish_stats(&self) {
        let connections = self.registry.connection_count();
        let rooms = self.rooms.room_count();
        self.stats.connections.store(connections, Ordering::Relaxed);
        self.stats.rooms.store(rooms, Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        {
            gauge!(HUB_CONNECTIONS_ACTIVE).set(connections as f64);
            gauge!(HUB_ROOMS_ACTIVE).set(rooms as f64);
        }
    }

    #[cfg(test)]
    fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[cfg(test)]
    fn rooms(&self) -> &RoomManager {
        &self.rooms
    }
}
