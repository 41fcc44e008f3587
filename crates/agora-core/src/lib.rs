//! # agora-core
//!
//! Foundation types for the Agora real-time fan-out layer.
//!
//! - Branded ID newtypes ([`ClientId`], [`SubscriptionId`])
//! - Namespaced room identifiers ([`RoomId`])
//! - The closed event-kind tag and immutable wire envelope
//!   ([`EventKind`], [`Envelope`], [`ClientMessage`])
//! - The shared error hierarchy ([`AgoraError`])

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod room;

pub use envelope::{ClientMessage, Envelope, EventKind};
pub use errors::AgoraError;
pub use ids::{ClientId, SubscriptionId};
pub use room::{PROPOSAL_TOPIC, RoomId};
