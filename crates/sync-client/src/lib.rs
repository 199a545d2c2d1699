//! Convoy sync client.
//!
//! One [`SyncClient`] per device. It keeps a WebSocket to the relay alive,
//! backs off exponentially when the relay is unreachable and, after too many
//! failed attempts, polls the relay over HTTP instead. Outbound messages go
//! over the socket when it is up and fall back to a one-shot HTTP submission
//! otherwise.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
pub mod subscribers;

pub use backoff::{ReconnectDecision, ReconnectPolicy, ReconnectState};
pub use client::{Delivery, SyncClient};
pub use config::SyncClientConfig;
pub use error::{SyncError, SyncResult};
pub use state::{ConnectionState, ConnectionStatus};
pub use subscribers::{SubscriberSet, Subscription};
