//! Cached state the relay hands to devices that join mid-trip.

use serde::{Deserialize, Serialize};

use crate::message::Payload;
use crate::payload::{ChatEntry, Location, NavigationPhase, Place, Weather};
use crate::role::VehicleId;
use crate::route::Route;

/// Latest convoy-wide trip state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvoySnapshot {
    /// Trip destination.
    #[serde(default)]
    pub destination: Option<Place>,
    /// Planned stops in order.
    #[serde(default)]
    pub waypoints: Vec<Place>,
    /// Latest weather report.
    #[serde(default)]
    pub weather: Option<Weather>,
    /// Route being driven.
    #[serde(default)]
    pub route: Option<Route>,
    /// Navigation phase of the lead.
    #[serde(default)]
    pub navigation_state: NavigationPhase,
}

impl ConvoySnapshot {
    /// Fold a relayed payload into the snapshot. Returns whether anything changed.
    pub fn apply(&mut self, payload: &Payload) -> bool {
        match payload {
            Payload::Destination(place) => {
                self.destination = Some(place.clone());
            }
            Payload::Waypoints(places) => {
                self.waypoints = places.clone();
            }
            Payload::Weather(weather) => {
                self.weather = Some(*weather);
            }
            Payload::Route(route) => {
                self.route = Some(route.as_ref().clone());
            }
            Payload::NavigationState(update) => {
                self.navigation_state = update.state;
                if update.state == NavigationPhase::Idle {
                    self.destination = None;
                    self.waypoints.clear();
                    self.route = None;
                }
            }
            _ => return false,
        }
        true
    }
}

/// Latest state of one vehicle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    /// Last reported position.
    #[serde(default)]
    pub position: Option<Location>,
    /// Remaining range in kilometers.
    #[serde(default)]
    pub range: Option<f64>,
    /// Chat history of the vehicle.
    #[serde(default)]
    pub chat_history: Vec<ChatEntry>,
}

impl VehicleSnapshot {
    /// Apply a relayed payload. Returns `true` if the snapshot changed.
    pub fn apply(&mut self, payload: &Payload) -> bool {
        match payload {
            Payload::Location(location) => {
                self.position = Some(*location);
            }
            Payload::Range(range) => {
                self.range = Some(range.remaining_range);
            }
            Payload::ChatHistory(history) => {
                self.chat_history = history.messages.clone();
            }
            _ => return false,
        }
        true
    }
}

/// `vehicle_state` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStateUpdate {
    /// Vehicle the state belongs to.
    pub vehicle: VehicleId,
    /// Full vehicle state.
    #[serde(flatten)]
    pub state: VehicleSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{NavigationStateUpdate, RangeUpdate};

    #[test]
    fn test_idle_clears_trip() {
        let mut snapshot = ConvoySnapshot::default();
        assert!(snapshot.apply(&Payload::Destination(Place::new("Home", 1.0, 2.0))));
        assert!(snapshot.apply(&Payload::Waypoints(vec![Place::new("A", 1.0, 1.0)])));
        assert!(snapshot.apply(&Payload::NavigationState(NavigationStateUpdate {
            state: NavigationPhase::Active,
        })));
        assert!(snapshot.destination.is_some());

        snapshot.apply(&Payload::NavigationState(NavigationStateUpdate {
            state: NavigationPhase::Idle,
        }));
        assert!(snapshot.destination.is_none());
        assert!(snapshot.waypoints.is_empty());
        assert_eq!(snapshot.navigation_state, NavigationPhase::Idle);
    }

    #[test]
    fn test_vehicle_snapshot_ignores_convoy_payloads() {
        let mut snapshot = VehicleSnapshot::default();
        assert!(!snapshot.apply(&Payload::Destination(Place::new("Home", 1.0, 2.0))));
        assert!(snapshot.apply(&Payload::Range(RangeUpdate {
            remaining_range: 321.0
        })));
        assert_eq!(snapshot.range, Some(321.0));
    }
}
