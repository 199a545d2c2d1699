//! Convoy Navigation - Schema Definitions.
//!
//! Shared data model for every convoy device and the relay:
//!
//! - `route` - route polyline, legs and maneuver steps as returned by a route provider
//! - `role` - the four device slots (`car1-main`, `car1-rear`, `car2-main`, `car2-rear`)
//! - `payload` - typed payloads carried by each message type
//! - `message` - the `{type, deviceRole, timestamp, data}` wire envelope
//! - `snapshot` - cached convoy and vehicle state handed to late joiners.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod message;
pub mod payload;
pub mod role;
pub mod route;
pub mod snapshot;

pub use error::{ProtocolError, SchemaError};
pub use message::{ConvoyMessage, MessageScope, MessageType, Payload, WireEnvelope, now_millis};
pub use payload::{
    ChatEntry, ChatHistory, ChatRole, Location, NavigationInfo, NavigationPhase,
    NavigationStateUpdate, Place, RangeUpdate, Register, RoleAssigned, RoleRejected,
    StopRequest, StopRequestRef, WaypointAdded, Weather,
};
pub use role::{DeviceRole, MessageOrigin, Seat, VehicleId};
pub use route::{LatLng, Leg, ManeuverType, Modifier, Route, Step};
pub use snapshot::{ConvoySnapshot, VehicleSnapshot, VehicleStateUpdate};

/// Public prelude module for explicit imports.
pub mod prelude {
    pub use crate::message::{ConvoyMessage, MessageScope, MessageType, Payload};
    pub use crate::payload::*;
    pub use crate::role::{DeviceRole, MessageOrigin, Seat, VehicleId};
    pub use crate::route::{LatLng, Leg, ManeuverType, Modifier, Route, Step};
    pub use crate::snapshot::{ConvoySnapshot, VehicleSnapshot, VehicleStateUpdate};
}
