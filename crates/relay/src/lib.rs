//! Convoy Navigation - Relay.
//!
//! Hands out the four device slots, rebroadcasts messages by scope, caches
//! the latest trip and vehicle state for late joiners and queues messages
//! for devices that fell back to polling.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod hub;
pub mod server;
pub mod slots;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use hub::{HealthReport, Hub, Outbound, Registration};
pub use server::{router, serve, spawn};
pub use slots::{ConnectionId, Slot, SlotStatus, SlotTable};
