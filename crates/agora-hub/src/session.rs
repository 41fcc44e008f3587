//! Socket session lifecycle — drives a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::connection::HubConnection;
use crate::hub::{HubCommand, HubHandle};

/// Run a WebSocket session for an authenticated client.
///
/// 1. Registers the connection with the hub (which sends the welcome
///    envelope through the outbound channel)
/// 2. Forwards outbound envelopes and periodic Ping frames on one task
/// 3. Feeds inbound text frames to the hub
/// 4. Reports the disconnect to the hub on exit
#[instrument(skip_all, fields(identity = %conn.identity))]
pub async fn run_socket_session(
    ws: WebSocket,
    conn: Arc<HubConnection>,
    mut outbound: mpsc::Receiver<Arc<String>>,
    hub: HubHandle,
    ping_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let cancel = conn.cancel_token();

    if hub.submit(HubCommand::Attach(Arc::clone(&conn))).await.is_err() {
        warn!("hub is gone, refusing session");
        return;
    }

    // Outbound forwarder. Exits when the hub drops the send side, the
    // socket write fails, or the connection is superseded.
    let forwarder_cancel = cancel.clone();
    let forwarder = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        let _ = ping.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                () = forwarder_cancel.cancelled() => break,
                msg = outbound.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => {
                debug!("session superseded");
                break;
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(msg)) => msg,
                _ => break,
            },
        };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    debug!(len = data.len(), "non-UTF8 binary frame ignored");
                    None
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => None,
        };

        if let Some(text) = text {
            let cmd = HubCommand::Inbound {
                identity: conn.identity.clone(),
                text,
            };
            if hub.submit(cmd).await.is_err() {
                break;
            }
        }
    }

    // The hub ignores this when a newer connection already superseded us.
    let _ = hub.submit(HubCommand::Detach(conn)).await;
    forwarder.abort();
}
