//! Convoy Navigation - Display runtime.
//!
//! Headless core of one in-car display. A [`Controller`] owns trip state,
//! the motion simulation and voice guidance for its role, and a
//! [`Dashboard`] wires it to the relay through the sync client.

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod controller;
pub mod runtime;
pub mod throttle;

pub use config::DashboardConfig;
pub use controller::Controller;
pub use runtime::{Dashboard, DashboardCommand};
pub use throttle::{PeriodicGate, RangeTracker};
