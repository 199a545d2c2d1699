//! Typed payloads carried in the `data` field of a convoy message.

use serde::{Deserialize, Serialize};

use crate::role::DeviceRole;
use crate::route::LatLng;

/// Vehicle position broadcast by a main display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Degrees clockwise from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl Location {
    /// Position as a coordinate.
    pub fn point(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Named point used for destinations and waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Display name.
    pub name: String,
}

impl Place {
    /// Create a named place.
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: name.into(),
        }
    }

    /// Position as a coordinate.
    pub fn point(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Navigation lifecycle of a main display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationPhase {
    #[default]
    Idle,
    Preview,
    Active,
}

/// Navigation phase broadcast by a main display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationStateUpdate {
    /// New phase.
    pub state: NavigationPhase,
}

/// Trip progress summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationInfo {
    /// Arrival time as epoch milliseconds.
    pub eta: i64,
    /// Seconds.
    pub time_left: f64,
    /// Meters.
    pub distance: f64,
    /// Meters to the next stop.
    #[serde(default)]
    pub next_stop_distance: Option<f64>,
    /// Seconds to the next stop.
    #[serde(default)]
    pub next_stop_duration: Option<f64>,
}

/// Remaining range in kilometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeUpdate {
    /// Kilometers.
    pub remaining_range: f64,
}

/// Current weather at the convoy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Degrees Celsius, rounded.
    pub temp: i32,
    /// Provider condition code.
    pub code: i32,
}

/// Author of a chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One chat entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

/// Full chat history of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    /// Entries, oldest first.
    pub messages: Vec<ChatEntry>,
}

/// Stop requested by a rear display, resolved by its main display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    /// Identifier chosen by the requesting seat.
    pub request_id: String,
    /// Requested stop.
    #[serde(flatten)]
    pub place: Place,
}

/// Waypoint appended to the active trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointAdded {
    /// Id of the stop request this addition resolves, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Added stop.
    #[serde(flatten)]
    pub place: Place,
}

/// Reference to a pending stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequestRef {
    /// Identifier of the request.
    pub request_id: String,
}

/// First message a device sends on a fresh connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    /// Role the device would like. The relay only logs it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_role: Option<DeviceRole>,
}

/// Role handed out by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssigned {
    /// Role the relay bound to the connection.
    pub assigned_role: DeviceRole,
}

/// Registration refused by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRejected {
    /// Why the registration was refused.
    pub reason: String,
}

impl RoleRejected {
    /// Reason sent when every slot is taken.
    pub const NO_ROLE_AVAILABLE: &'static str = "no role available";

    /// Rejection sent when every slot is taken.
    pub fn no_role_available() -> Self {
        Self {
            reason: Self::NO_ROLE_AVAILABLE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_waypoint_added_flattens_place() -> TestResult {
        let added = WaypointAdded {
            request_id: Some("req-1".to_string()),
            place: Place::new("Fuel", 48.1, 11.5),
        };
        let json = serde_json::to_value(&added)?;
        assert_eq!(json["requestId"], "req-1");
        assert_eq!(json["name"], "Fuel");
        assert!(json.get("place").is_none());

        let back: WaypointAdded = serde_json::from_value(json)?;
        assert_eq!(back, added);
        Ok(())
    }

    #[test]
    fn test_waypoint_added_without_request_id() -> TestResult {
        let back: WaypointAdded =
            serde_json::from_str(r#"{"name":"Cafe","latitude":1.0,"longitude":2.0}"#)?;
        assert_eq!(back.request_id, None);
        assert_eq!(back.place.name, "Cafe");
        Ok(())
    }

    #[test]
    fn test_navigation_info_accepts_null_stops() -> TestResult {
        let info: NavigationInfo = serde_json::from_str(
            r#"{"eta":1700000000000,"timeLeft":600,"distance":5000,"nextStopDistance":null,"nextStopDuration":null}"#,
        )?;
        assert_eq!(info.next_stop_distance, None);
        assert_eq!(info.eta, 1_700_000_000_000);
        Ok(())
    }

    #[test]
    fn test_navigation_phase_lowercase() -> TestResult {
        let update: NavigationStateUpdate = serde_json::from_str(r#"{"state":"preview"}"#)?;
        assert_eq!(update.state, NavigationPhase::Preview);
        Ok(())
    }
}
