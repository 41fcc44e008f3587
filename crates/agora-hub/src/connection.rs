//! Hub-side connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agora_core::ClientId;

/// Liveness state of a hub-side connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, not yet registered with the hub.
    Connecting,
    /// Registered; envelopes may be written.
    Open,
    /// Superseded or shutting down; writes are refused.
    Closing,
    /// Terminal.
    Closed,
}

/// One connected client, owned by the hub.
///
/// Writes go through a bounded channel to the socket's write task; a full
/// or closed channel is a send failure, which the hub treats as an
/// implicit disconnect of the member.
pub struct HubConnection {
    /// Identity this connection authenticated as.
    pub identity: ClientId,
    tx: mpsc::Sender<Arc<String>>,
    state: Mutex<ConnectionState>,
    cancel: CancellationToken,
    /// When this connection was accepted.
    pub connected_at: Instant,
    dropped: AtomicU64,
}

impl HubConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(identity: ClientId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            identity,
            tx,
            state: Mutex::new(ConnectionState::Connecting),
            cancel: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Current liveness state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether writes are currently accepted.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Transition to `Open` (called by the hub on registration).
    pub fn open(&self) {
        *self.state.lock() = ConnectionState::Open;
    }

    /// Mark terminally closed.
    pub fn close(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }

    /// Supersede this connection: refuse further writes and cancel its
    /// socket tasks. Used when the same identity registers a newer
    /// connection, and on shutdown.
    pub fn supersede(&self) {
        *self.state.lock() = ConnectionState::Closing;
        self.cancel.cancel();
    }

    /// Token cancelled when the connection is superseded.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send pre-serialized text to the client.
    ///
    /// Returns `false` when the connection is not open or the channel is
    /// full/closed; the dropped counter increments on channel failure.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Messages dropped due to a full or closed channel.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
