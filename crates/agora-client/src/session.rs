//! Client session — one logical connection to the hub that survives
//! socket loss.
//!
//! The session reconnects with exponential backoff after an unexpected
//! disconnect and resets its attempt counter on every successful connect.
//! Sends issued while disconnected are dropped, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agora_core::{AgoraError, Envelope, EventKind, SubscriptionId};

use crate::backoff::ReconnectPolicy;
use crate::subscriptions::SubscriptionTable;

/// Outbound queue depth; a full queue drops the frame.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// First connection attempt in progress.
    Connecting,
    /// Socket open; sends go out.
    Connected,
    /// Socket lost; backoff and retry in progress.
    Reconnecting,
    /// Attempt budget spent; the session will not reconnect.
    Failed,
    /// Closed by [`ClientSession::close`].
    Closed,
}

/// Why [`ClientSession::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// [`ClientSession::close`] was called.
    Closed,
    /// Every reconnect attempt failed.
    Exhausted,
    /// Another `run` call on this session is already driving the
    /// connection; this one did nothing.
    AlreadyRunning,
}

enum ConnectionEnd {
    Closed,
    Lost,
}

struct SessionInner {
    url: String,
    policy: ReconnectPolicy,
    subscriptions: SubscriptionTable,
    state: Mutex<SessionState>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    cancel: CancellationToken,
    running: AtomicBool,
}

/// Handle to a hub session. Clone freely; all clones share one
/// connection.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl ClientSession {
    /// Create a session for `url` (e.g. `ws://host:port/ws?identity=u1`).
    /// No I/O happens until [`ClientSession::run`].
    #[must_use]
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                url: url.into(),
                policy,
                subscriptions: SubscriptionTable::new(),
                state: Mutex::new(SessionState::Connecting),
                outbound: Mutex::new(None),
                cancel: CancellationToken::new(),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Register a callback on a channel (an event kind, an entity room
    /// such as `proposal:42`, or `global`).
    pub fn subscribe(
        &self,
        channel: &str,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.subscriptions.subscribe(channel, callback)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        self.inner.subscriptions.unsubscribe(id)
    }

    /// Send a message to the hub. Returns `false` and drops the message
    /// when the session is not connected or the outbound queue is full.
    pub fn send(&self, kind: EventKind, data: Value) -> bool {
        if !self.is_connected() {
            debug!(kind = %kind, "not connected, message dropped");
            return false;
        }
        let frame = json!({"kind": kind.as_str(), "data": data}).to_string();
        match &*self.inner.outbound.lock() {
            Some(tx) => {
                if tx.try_send(frame).is_ok() {
                    true
                } else {
                    warn!(kind = %kind, "outbound queue full, message dropped");
                    false
                }
            }
            None => false,
        }
    }

    /// Close the session. [`ClientSession::run`] returns
    /// [`SessionEnd::Closed`] shortly after.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// Drive the session: connect, dispatch inbound envelopes, reconnect
    /// on loss. Returns when closed or the attempt budget is spent.
    ///
    /// At most one physical connection attempt is in flight at a time:
    /// a second concurrent `run` (on this handle or a clone) is a no-op
    /// returning [`SessionEnd::AlreadyRunning`].
    pub async fn run(&self) -> SessionEnd {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("session is already running, ignoring duplicate run");
            return SessionEnd::AlreadyRunning;
        }
        let end = self.drive().await;
        self.inner.running.store(false, Ordering::SeqCst);
        end
    }

    async fn drive(&self) -> SessionEnd {
        let mut attempt: u32 = 0;
        loop {
            if self.inner.cancel.is_cancelled() {
                self.set_state(SessionState::Closed);
                return SessionEnd::Closed;
            }

            match connect_async(&self.inner.url).await {
                Ok((ws, _)) => {
                    info!(url = %self.inner.url, "connected");
                    attempt = 0;
                    match self.run_connection(ws).await {
                        ConnectionEnd::Closed => {
                            self.set_state(SessionState::Closed);
                            return SessionEnd::Closed;
                        }
                        ConnectionEnd::Lost => {
                            warn!("connection lost");
                        }
                    }
                }
                Err(e) => {
                    let err = AgoraError::Transport(e.to_string());
                    warn!(error = %err, "connect failed");
                }
            }

            attempt += 1;
            let Some(delay) = self.inner.policy.delay(attempt) else {
                error!(attempts = attempt - 1, "reconnect budget spent, giving up");
                self.set_state(SessionState::Failed);
                return SessionEnd::Exhausted;
            };
            self.set_state(SessionState::Reconnecting);
            info!(attempt, ?delay, "reconnecting after backoff");
            tokio::select! {
                () = self.inner.cancel.cancelled() => {
                    self.set_state(SessionState::Closed);
                    return SessionEnd::Closed;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_connection(&self, ws: WsStream) -> ConnectionEnd {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);
        *self.inner.outbound.lock() = Some(out_tx);
        self.set_state(SessionState::Connected);

        let end = loop {
            tokio::select! {
                () = self.inner.cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break ConnectionEnd::Closed;
                }
                frame = out_rx.recv() => {
                    // The sender lives in `self.inner.outbound`, so recv
                    // only yields Some until this connection ends.
                    if let Some(text) = frame {
                        if ws_tx.send(Message::text(text)).await.is_err() {
                            break ConnectionEnd::Lost;
                        }
                    }
                }
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(_))) | None => break ConnectionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "socket error");
                        break ConnectionEnd::Lost;
                    }
                },
            }
        };

        *self.inner.outbound.lock() = None;
        end
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                let _ = self.inner.subscriptions.dispatch(&envelope);
            }
            Err(e) => warn!(error = %e, "undecodable envelope, dropped"),
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.inner.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(10),
            max_attempts,
        }
    }

    #[test]
    fn starts_connecting() {
        let session = ClientSession::new("ws://127.0.0.1:1/ws?identity=a", fast_policy(1));
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(!session.is_connected());
    }

    #[test]
    fn send_while_disconnected_drops() {
        let session = ClientSession::new("ws://127.0.0.1:1/ws?identity=a", fast_policy(1));
        assert!(!session.send(EventKind::MarkAllRead, json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempt_budget() {
        // Port 1 refuses immediately; paused clock skips the backoff.
        let session = ClientSession::new("ws://127.0.0.1:1/ws?identity=a", fast_policy(3));
        let end = session.run().await;
        assert_eq!(end, SessionEnd::Exhausted);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_run_on_a_clone_is_a_no_op() {
        let session = ClientSession::new(
            "ws://127.0.0.1:1/ws?identity=a",
            ReconnectPolicy {
                base: Duration::from_secs(3600),
                max_attempts: 5,
            },
        );
        let runner = {
            let session = session.clone();
            tokio::spawn(async move { session.run().await })
        };
        // Let the first runner claim the session and enter backoff.
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A second run must not open a second socket for the identity.
        assert_eq!(session.run().await, SessionEnd::AlreadyRunning);

        session.close();
        assert_eq!(runner.await.unwrap(), SessionEnd::Closed);

        // Once the driver has exited, the session may be driven again.
        assert_eq!(session.run().await, SessionEnd::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn close_interrupts_backoff() {
        let session = ClientSession::new(
            "ws://127.0.0.1:1/ws?identity=a",
            ReconnectPolicy {
                base: Duration::from_secs(3600),
                max_attempts: 5,
            },
        );
        let runner = {
            let session = session.clone();
            tokio::spawn(async move { session.run().await })
        };

        // Give the first connect a chance to fail and enter backoff.
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.close();

        let end = runner.await.unwrap();
        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(session.state(), SessionState::Closed);
    }
}
