//! # agora-feeds
//!
//! Client-side state machines that reduce hub envelopes into UI-ready
//! state: a deduplicating notification feed and a live vote tally with
//! quorum detection.

#![deny(unsafe_code)]

pub mod notifications;
pub mod voting;

pub use notifications::{Notification, NotificationFeed, Priority};
pub use voting::{RecentVote, VoteChoice, VoteSnapshot, VoteTally};
