//! Convoy navigation engine.
//!
//! Everything the driving display needs to move a simulated vehicle along a
//! route and talk the driver through it:
//!
//! - [`simulation`] advances [`SimulationState`] one tick at a time
//! - [`maneuver`] derives the next maneuver from a route and travelled distance
//! - [`guidance`] decides when a spoken instruction fires
//! - [`provider`] fetches routes from an external routing service.
//!
//! The engine never schedules itself. Callers own the clock and pass elapsed
//! time into [`advance`].

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod geo;
pub mod guidance;
pub mod maneuver;
pub mod polyline;
pub mod provider;
pub mod simulation;

pub use config::{AnnouncementBandConfig, GuidanceConfig, SimulationConfig, SpeedLimitBand};
pub use error::{RouteError, RouteResult};
pub use guidance::{Announcement, AnnouncementKey, LogVoiceSink, VoiceGuidance, VoiceSink};
pub use maneuver::{LegProgress, Maneuver, leg_progress, next_maneuver};
pub use provider::{
    AvoidanceFlags, OsrmRouteProvider, RouteProvider, RouteRequest, StaticRouteProvider,
    fetch_route,
};
pub use simulation::{SimulationEvent, SimulationReport, SimulationState, Tick, TickClock, advance};
