//! Live vote tally with quorum detection and viewer presence.
//!
//! Counts votes observed on one entity's room, derives participation
//! against a fixed voter denominator, and announces the quorum crossing
//! exactly once per tally. Several clients may observe the same crossing;
//! an observed announcement latches the tally so it never adds its own.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::debug;

use agora_client::{ClientSession, OutboundSink};
use agora_core::{ClientId, Envelope, EventKind, RoomId, SubscriptionId};

/// Fixed voter denominator for participation percentage.
pub const QUORUM_DENOMINATOR: u64 = 1000;

/// Participation percentage at which quorum is reached.
pub const QUORUM_THRESHOLD_PCT: f64 = 51.0;

/// Recent votes retained for display.
pub const RECENT_CAP: usize = 10;

/// A vote choice on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteChoice {
    /// In favor.
    For,
    /// Opposed.
    Against,
    /// Counted for participation, not direction.
    Abstain,
}

impl VoteChoice {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "for" => Some(Self::For),
            "against" => Some(Self::Against),
            "abstain" => Some(Self::Abstain),
            _ => None,
        }
    }
}

/// One recently observed vote.
#[derive(Clone, Debug)]
pub struct RecentVote {
    /// Who voted.
    pub user_id: String,
    /// Their choice.
    pub choice: VoteChoice,
    /// Voting weight carried on the wire (display only; the tally counts
    /// ballots, not weight).
    pub weight: f64,
    /// When the vote was emitted by the hub.
    pub at: DateTime<Utc>,
}

/// Point-in-time view of a tally.
#[derive(Clone, Debug)]
pub struct VoteSnapshot {
    /// Ballots in favor.
    pub for_votes: u64,
    /// Ballots opposed.
    pub against_votes: u64,
    /// Abstentions.
    pub abstain_votes: u64,
    /// All ballots observed.
    pub total: u64,
    /// Participation against [`QUORUM_DENOMINATOR`], as a percentage.
    pub quorum_pct: f64,
    /// Whether the quorum threshold has been crossed.
    pub quorum_reached: bool,
    /// Newest-first recent votes, capped at [`RECENT_CAP`].
    pub recent: Vec<RecentVote>,
    /// Identities currently viewing the entity's room.
    pub viewers: usize,
}

struct TallyState {
    for_votes: u64,
    against_votes: u64,
    abstain_votes: u64,
    recent: VecDeque<RecentVote>,
    viewers: HashSet<ClientId>,
    announced: bool,
}

/// Reduces room envelopes for one entity into a live tally.
pub struct VoteTally {
    entity_id: String,
    room: RoomId,
    sink: Arc<dyn OutboundSink>,
    state: Mutex<TallyState>,
}

impl VoteTally {
    /// Create a tally for one entity, announcing quorum through `sink`.
    pub fn new(entity_id: impl Into<String>, sink: Arc<dyn OutboundSink>) -> Self {
        let entity_id = entity_id.into();
        Self {
            room: RoomId::proposal(&entity_id),
            entity_id,
            sink,
            state: Mutex::new(TallyState {
                for_votes: 0,
                against_votes: 0,
                abstain_votes: 0,
                recent: VecDeque::with_capacity(RECENT_CAP),
                viewers: HashSet::new(),
                announced: false,
            }),
        }
    }

    /// Subscribe this tally to the channels it reduces.
    pub fn attach(self: &Arc<Self>, session: &ClientSession) -> Vec<SubscriptionId> {
        ["vote", "user-joined", "user-left", "quorum-reached"]
            .iter()
            .map(|channel| {
                let tally = Arc::clone(self);
                session.subscribe(channel, move |env| tally.apply(env))
            })
            .collect()
    }

    /// Reduce one envelope. Envelopes for other entities or rooms are
    /// ignored.
    pub fn apply(&self, envelope: &Envelope) {
        match envelope.kind {
            EventKind::Vote => self.apply_vote(envelope),
            EventKind::UserJoined | EventKind::UserLeft => self.apply_presence(envelope),
            EventKind::QuorumReached => {
                if envelope.entity_id.as_deref() == Some(&self.entity_id) {
                    // Another observer already announced; never re-announce.
                    self.state.lock().announced = true;
                }
            }
            _ => {}
        }
    }

    fn apply_vote(&self, envelope: &Envelope) {
        if envelope.entity_id.as_deref() != Some(&self.entity_id) {
            return;
        }
        let data = &envelope.data;
        let Some(choice) = data
            .get("choice")
            .and_then(Value::as_str)
            .and_then(VoteChoice::parse)
        else {
            debug!("vote with unknown choice ignored");
            return;
        };

        let announce = {
            let mut state = self.state.lock();
            match choice {
                VoteChoice::For => state.for_votes += 1,
                VoteChoice::Against => state.against_votes += 1,
                VoteChoice::Abstain => state.abstain_votes += 1,
            }

            state.recent.push_front(RecentVote {
                user_id: data
                    .get("userId")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned(),
                choice,
                weight: data.get("weight").and_then(Value::as_f64).unwrap_or(0.0),
                at: envelope.emitted_at,
            });
            state.recent.truncate(RECENT_CAP);

            let pct = quorum_pct(total(&state));
            if !state.announced && pct >= QUORUM_THRESHOLD_PCT {
                state.announced = true;
                Some(pct)
            } else {
                None
            }
        };

        if let Some(pct) = announce {
            let _ = self.sink.send(
                EventKind::QuorumReached,
                json!({ "entityId": self.entity_id, "quorumPct": pct }),
            );
        }
    }

    fn apply_presence(&self, envelope: &Envelope) {
        let data = &envelope.data;
        if data.get("roomId").and_then(Value::as_str) != Some(self.room.as_str()) {
            return;
        }
        let Some(user) = data.get("userId").and_then(Value::as_str) else {
            return;
        };
        let mut state = self.state.lock();
        if envelope.kind == EventKind::UserJoined {
            let _ = state.viewers.insert(ClientId::from(user));
        } else {
            let _ = state.viewers.remove(&ClientId::from(user));
        }
    }

    /// Cast this client's vote on the entity. The local tally does not
    /// move here; it moves when the hub fans the vote back to the room.
    pub fn cast_vote(&self, choice: VoteChoice, weight: f64, reason: Option<&str>) -> bool {
        let choice = match choice {
            VoteChoice::For => "for",
            VoteChoice::Against => "against",
            VoteChoice::Abstain => "abstain",
        };
        let mut data = json!({
            "entityId": self.entity_id,
            "choice": choice,
            "weight": weight,
        });
        if let Some(reason) = reason {
            data["reason"] = json!(reason);
        }
        self.sink.send(EventKind::Vote, data)
    }

    /// Current tally snapshot.
    #[must_use]
    pub fn snapshot(&self) -> VoteSnapshot {
        let state = self.state.lock();
        let total = total(&state);
        VoteSnapshot {
            for_votes: state.for_votes,
            against_votes: state.against_votes,
            abstain_votes: state.abstain_votes,
            total,
            quorum_pct: quorum_pct(total),
            quorum_reached: state.announced,
            recent: state.recent.iter().cloned().collect(),
            viewers: state.viewers.len(),
        }
    }
}

fn total(state: &TallyState) -> u64 {
    state.for_votes + state.against_votes + state.abstain_votes
}

#[allow(clippy::cast_precision_loss)]
fn quorum_pct(total: u64) -> f64 {
    (total as f64 / QUORUM_DENOMINATOR as f64) * 100.0
}
