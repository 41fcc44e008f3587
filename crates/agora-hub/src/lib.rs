//! # agora-hub
//!
//! Single-process publish/subscribe hub for the Agora real-time layer.
//!
//! - Axum HTTP front end: `/ws` upgrade (identity required), `/health`,
//!   `/metrics`
//! - Connection registry: one live connection per identity, supersede on
//!   re-register
//! - Room manager: lazily-created membership sets with empty-room GC
//! - Event router: per-kind validation and room targeting
//! - Hub actor: one task drains a command queue, processing each inbound
//!   message to completion before the next — the per-room ordering
//!   guarantee
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod ticker;
