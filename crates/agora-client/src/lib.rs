//! # agora-client
//!
//! Resilient WebSocket client session for the Agora real-time layer.
//!
//! - [`ClientSession`]: connect, auto-reconnect with exponential backoff,
//!   give up after a bounded number of attempts
//! - [`SubscriptionTable`]: channel-keyed callbacks with panic isolation
//! - [`OutboundSink`]: the send seam consumed by feed state machines

#![deny(unsafe_code)]

pub mod backoff;
pub mod session;
pub mod sink;
pub mod subscriptions;

pub use backoff::ReconnectPolicy;
pub use session::{ClientSession, SessionEnd, SessionState};
pub use sink::OutboundSink;
pub use subscriptions::SubscriptionTable;
