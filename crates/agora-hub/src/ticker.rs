//! Periodic system notifications for the global room.
//!
//! Disabled by default; enable by setting `system_tick_secs` in the
//! config. Mostly useful for demos and soak tests.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use agora_core::{Envelope, EventKind, RoomId};

use crate::hub::{HubCommand, HubHandle};

/// Messages rotated through by the ticker.
const TICKER_MESSAGES: [&str; 3] = [
    "New proposal activity detected",
    "Treasury snapshot updated",
    "Delegate voting power recalculated",
];

/// Publish a system notification to the global room every `interval`
/// until cancelled.
pub async fn run_ticker(hub: HubHandle, interval: Duration, cancel: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "system ticker started");
    let mut tick = tokio::time::interval(interval);
    let _ = tick.tick().await; // skip the immediate first tick
    let mut seq: usize = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        let envelope = system_notification(seq);
        seq = seq.wrapping_add(1);
        if hub
            .submit(HubCommand::Publish {
                room: RoomId::global(),
                envelope,
            })
            .await
            .is_err()
        {
            break;
        }
    }
    debug!("system ticker stopped");
}

fn system_notification(seq: usize) -> Envelope {
    let message = TICKER_MESSAGES[seq % TICKER_MESSAGES.len()];
    Envelope::new(
        EventKind::Notification,
        json!({
            "id": format!("system-{}", Utc::now().timestamp_millis()),
            "kind": "system",
            "title": "Platform Update",
            "message": message,
            "priority": "low",
        }),
    )
}
