//! Notification feed — newest-first, deduplicated, capped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::debug;

use agora_client::{ClientSession, OutboundSink};
use agora_core::{ClientId, Envelope, EventKind, SubscriptionId};

/// Maximum notifications retained; older entries fall off the end.
pub const FEED_CAP: usize = 50;

/// Display priority of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Routine updates.
    Low,
    /// Activity worth surfacing.
    Medium,
    /// Governance milestones.
    High,
}

impl Priority {
    fn parse(s: Option<&str>) -> Self {
        match s {
            Some("high") => Self::High,
            Some("medium") => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// One entry in the feed.
#[derive(Clone, Debug)]
pub struct Notification {
    /// Stable id; duplicates are dropped.
    pub id: String,
    /// Notification category (`vote`, `comment`, `quorum`, `system`).
    pub kind: String,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Entity the notification is about, if any.
    pub entity_id: Option<String>,
    /// Display priority.
    pub priority: Priority,
    /// Whether the user has read it.
    pub read: bool,
    /// When it arrived locally.
    pub received_at: DateTime<Utc>,
}

struct FeedState {
    entries: Vec<Notification>,
}

/// Deduplicating, capped notification feed.
///
/// Read-state changes are reported to the hub fire-and-forget; local
/// state is the source of truth for display.
pub struct NotificationFeed {
    identity: ClientId,
    sink: Arc<dyn OutboundSink>,
    state: Mutex<FeedState>,
}

impl NotificationFeed {
    /// Create a feed for `identity`, reporting read-state through `sink`.
    pub fn new(identity: ClientId, sink: Arc<dyn OutboundSink>) -> Self {
        Self {
            identity,
            sink,
            state: Mutex::new(FeedState {
                entries: Vec::new(),
            }),
        }
    }

    /// Subscribe this feed to every channel it reduces.
    pub fn attach(self: &Arc<Self>, session: &ClientSession) -> Vec<SubscriptionId> {
        ["notification", "vote", "comment", "quorum-reached"]
            .iter()
            .map(|channel| {
                let feed = Arc::clone(self);
                session.subscribe(channel, move |env| feed.apply(env))
            })
            .collect()
    }

    /// Reduce one envelope into the feed.
    ///
    /// `vote` and `comment` envelopes from this feed's own identity are
    /// skipped — a client never gets notified about its own action. Ids
    /// are stable per underlying event, so the same action observed on
    /// two channels (or announced by two observers) collapses to one
    /// entry.
    pub fn apply(&self, envelope: &Envelope) {
        let own = envelope.source_id.as_ref() == Some(&self.identity);
        let entry = match envelope.kind {
            EventKind::Notification if own => {
                // The hub already excludes the actor from derived
                // notifications; this guards direct publishes and replays.
                debug!("own activity, not added to feed");
                return;
            }
            EventKind::Notification => self.from_notification(envelope),
            EventKind::Vote if own => return,
            EventKind::Vote => self.from_vote(envelope),
            EventKind::Comment if own => return,
            EventKind::Comment => self.from_comment(envelope),
            EventKind::QuorumReached => self.from_quorum(envelope),
            _ => return,
        };
        let Some(entry) = entry else { return };

        let mut state = self.state.lock();
        if state.entries.iter().any(|n| n.id == entry.id) {
            debug!(id = entry.id, "duplicate notification dropped");
            return;
        }
        state.entries.insert(0, entry);
        state.entries.truncate(FEED_CAP);
    }

    fn from_notification(&self, envelope: &Envelope) -> Option<Notification> {
        let data = &envelope.data;
        let Some(id) = data.get("id").and_then(Value::as_str) else {
            debug!("notification without id, dropped");
            return None;
        };
        Some(Notification {
            id: id.to_owned(),
            kind: str_field(data, "kind").unwrap_or_else(|| "system".into()),
            title: str_field(data, "title").unwrap_or_default(),
            message: str_field(data, "message").unwrap_or_default(),
            entity_id: str_field(data, "entityId").or_else(|| envelope.entity_id.clone()),
            priority: Priority::parse(data.get("priority").and_then(Value::as_str)),
            read: false,
            received_at: Utc::now(),
        })
    }

    /// Same id scheme as the hub's derived global notification, so a
    /// client in both the entity room and `global` stores the vote once.
    fn from_vote(&self, envelope: &Envelope) -> Option<Notification> {
        let entity_id = envelope.entity_id.clone()?;
        let source = envelope.source_id.as_ref()?;
        let choice = str_field(&envelope.data, "choice")?;
        Some(Notification {
            id: format!(
                "vote-{entity_id}-{source}-{}",
                envelope.emitted_at.timestamp_millis()
            ),
            kind: "vote".into(),
            title: "New Vote Cast".into(),
            message: format!("{source} voted {}", choice.to_uppercase()),
            entity_id: Some(entity_id),
            priority: Priority::Medium,
            read: false,
            received_at: Utc::now(),
        })
    }

    fn from_comment(&self, envelope: &Envelope) -> Option<Notification> {
        let comment_id = str_field(&envelope.data, "commentId")?;
        let source = envelope.source_id.as_ref()?;
        Some(Notification {
            id: format!("comment-{comment_id}"),
            kind: "comment".into(),
            title: "New Comment".into(),
            message: format!("{source} commented"),
            entity_id: envelope.entity_id.clone(),
            priority: Priority::Low,
            read: false,
            received_at: Utc::now(),
        })
    }

    /// Entity-keyed id: several observers may announce the same crossing,
    /// and every duplicate collapses onto the first.
    fn from_quorum(&self, envelope: &Envelope) -> Option<Notification> {
        let entity_id = envelope
            .entity_id
            .clone()
            .or_else(|| str_field(&envelope.data, "entityId"))?;
        let pct = envelope.data.get("quorumPct").and_then(Value::as_f64);
        Some(Notification {
            id: format!("quorum-{entity_id}"),
            kind: "quorum".into(),
            title: "Quorum Reached".into(),
            message: match pct {
                Some(pct) => format!("Proposal {entity_id} reached {pct:.1}% participation"),
                None => format!("Proposal {entity_id} reached quorum"),
            },
            entity_id: Some(entity_id),
            priority: Priority::High,
            read: false,
            received_at: Utc::now(),
        })
    }

    /// Newest-first snapshot of the feed.
    #[must_use]
    pub fn entries(&self) -> Vec<Notification> {
        self.state.lock().entries.clone()
    }

    /// Number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.state.lock().entries.iter().filter(|n| !n.read).count()
    }

    /// Mark one notification read, locally and on the hub.
    pub fn mark_as_read(&self, id: &str) {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.iter_mut().find(|n| n.id == id) else {
            return;
        };
        if entry.read {
            return;
        }
        entry.read = true;
        drop(state);
        let _ = self
            .sink
            .send(EventKind::MarkRead, json!({ "notificationId": id }));
    }

    /// Mark everything read, locally and on the hub.
    pub fn mark_all_as_read(&self) {
        {
            let mut state = self.state.lock();
            for entry in &mut state.entries {
                entry.read = true;
            }
        }
        let _ = self.sink.send(EventKind::MarkAllRead, json!({}));
    }

    /// Drop every entry. Local only.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }
}

fn str_field(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_owned)
}
