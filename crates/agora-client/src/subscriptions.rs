//! Channel-keyed subscription callbacks.
//!
//! An envelope is dispatched to three channels: its kind (e.g. `"vote"`),
//! its entity room (e.g. `"proposal:42"`) when it carries one, and
//! `"global"`, which sees everything.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use agora_core::{Envelope, SubscriptionId};

/// The channel every envelope is dispatched to.
pub const GLOBAL_CHANNEL: &str = "global";

type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    callback: Callback,
}

/// Registered callbacks, keyed by channel.
#[derive(Default)]
pub struct SubscriptionTable {
    channels: Mutex<HashMap<String, Vec<Entry>>>,
}

impl SubscriptionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback on a channel. Returns the id used to
    /// unsubscribe.
    pub fn subscribe(
        &self,
        channel: &str,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_default()
            .push(Entry {
                id: id.clone(),
                callback: Arc::new(callback),
            });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let mut channels = self.channels.lock();
        for entries in channels.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.id != *id);
            if entries.len() != before {
                return true;
            }
        }
        false
    }

    /// Number of live subscriptions across all channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.lock().values().map(Vec::len).sum()
    }

    /// Whether no subscriptions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback whose channel matches the envelope.
    ///
    /// Callbacks run against a snapshot taken before any is invoked:
    /// subscribing or unsubscribing from inside a callback affects the
    /// next dispatch, not this one. A panicking callback is logged and
    /// skipped; the rest still run. Returns the number invoked.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let mut matched: Vec<Callback> = Vec::new();
        {
            let channels = self.channels.lock();
            let mut collect = |channel: &str| {
                if let Some(entries) = channels.get(channel) {
                    matched.extend(entries.iter().map(|e| Arc::clone(&e.callback)));
                }
            };
            collect(envelope.kind.as_str());
            if let Some(room) = envelope.entity_room() {
                collect(room.as_str());
            }
            collect(GLOBAL_CHANNEL);
        }

        trace!(kind = %envelope.kind, callbacks = matched.len(), "dispatch");
        let mut invoked = 0;
        for callback in matched {
            if catch_unwind(AssertUnwindSafe(|| callback(envelope))).is_err() {
                warn!(kind = %envelope.kind, "subscriber panicked, skipping");
            } else {
                invoked += 1;
            }
        }
        invoked
    }
}
