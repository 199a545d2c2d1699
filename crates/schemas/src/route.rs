//! Route data model.
//!
//! A route is fetched once from a route provider and never mutated afterwards.
//! Rerouting produces a new `Route` value.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Absolute slack allowed between the summed leg distances and the route total.
const LEG_SUM_TOLERANCE_M: f64 = 1.0;

/// Relative slack allowed between the summed leg distances and the route total.
const LEG_SUM_TOLERANCE_RATIO: f64 = 0.005;

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl LatLng {
    /// Create a coordinate.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Kind of maneuver at the start of a step.
///
/// Names follow the route provider's vocabulary. The underscore variants are
/// produced by the geometric fallback when a route carries no steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManeuverType {
    #[serde(rename = "depart")]
    Depart,
    #[serde(rename = "arrive")]
    Arrive,
    #[serde(rename = "turn")]
    Turn,
    #[serde(rename = "new name")]
    NewName,
    #[serde(rename = "continue")]
    Continue,
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "on ramp")]
    OnRamp,
    #[serde(rename = "off ramp")]
    OffRamp,
    #[serde(rename = "fork")]
    Fork,
    #[serde(rename = "end of road")]
    EndOfRoad,
    #[serde(rename = "roundabout")]
    Roundabout,
    #[serde(rename = "rotary")]
    Rotary,
    #[serde(rename = "roundabout turn")]
    RoundaboutTurn,
    #[serde(rename = "exit roundabout")]
    ExitRoundabout,
    #[serde(rename = "exit rotary")]
    ExitRotary,
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "turn_right")]
    TurnRight,
    #[serde(rename = "turn_left")]
    TurnLeft,
    #[serde(rename = "u_turn")]
    UTurn,
    #[serde(other)]
    Other,
}

impl ManeuverType {
    /// Check whether this is a roundabout or rotary maneuver.
    pub fn is_roundabout(self) -> bool {
        matches!(
            self,
            Self::Roundabout | Self::Rotary | Self::RoundaboutTurn
        )
    }

    /// OSRM name of the maneuver type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Depart => "depart",
            Self::Arrive => "arrive",
            Self::Turn => "turn",
            Self::NewName => "new name",
            Self::Continue => "continue",
            Self::Merge => "merge",
            Self::OnRamp => "on ramp",
            Self::OffRamp => "off ramp",
            Self::Fork => "fork",
            Self::EndOfRoad => "end of road",
            Self::Roundabout => "roundabout",
            Self::Rotary => "rotary",
            Self::RoundaboutTurn => "roundabout turn",
            Self::ExitRoundabout => "exit roundabout",
            Self::ExitRotary => "exit rotary",
            Self::Notification => "notification",
            Self::TurnRight => "turn_right",
            Self::TurnLeft => "turn_left",
            Self::UTurn => "u_turn",
            Self::Other => "other",
        }
    }
}

/// Direction qualifier of a maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    #[serde(rename = "uturn")]
    UTurn,
    #[serde(rename = "sharp right")]
    SharpRight,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "slight right")]
    SlightRight,
    #[serde(rename = "straight")]
    Straight,
    #[serde(rename = "slight left")]
    SlightLeft,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "sharp left")]
    SharpLeft,
    #[serde(other)]
    Other,
}

impl Modifier {
    /// Spoken form of the modifier.
    pub fn as_phrase(self) -> &'static str {
        match self {
            Self::UTurn => "make a U-turn",
            Self::SharpRight => "turn sharp right",
            Self::Right => "turn right",
            Self::SlightRight => "bear right",
            Self::Straight => "continue straight",
            Self::SlightLeft => "bear left",
            Self::Left => "turn left",
            Self::SharpLeft => "turn sharp left",
            Self::Other => "continue",
        }
    }
}

/// One maneuver step inside a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Kind of maneuver.
    pub maneuver_type: ManeuverType,
    /// Direction of the maneuver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Modifier>,
    /// Roundabout exit to take.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_number: Option<u32>,
    /// Where the maneuver happens.
    pub location: LatLng,
    /// Length of the step in meters.
    pub distance: f64,
    /// Expected duration of the step in seconds.
    pub duration: f64,
    /// Road name after the maneuver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Portion of a route between two consecutive stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Leg length in meters.
    pub distance: f64,
    /// Leg duration in seconds.
    pub duration: f64,
    /// Turn-by-turn steps, possibly empty.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Computed route from origin through waypoints to destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Route geometry.
    pub coordinates: Vec<LatLng>,
    /// Total distance in meters.
    pub distance: f64,
    /// Total duration in seconds.
    pub duration: f64,
    /// Legs between consecutive stops.
    #[serde(default)]
    pub legs: Vec<Leg>,
}

impl Route {
    /// Check the structural invariants a route must satisfy before it can be driven.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.coordinates.len() < 2 {
            return Err(SchemaError::TooFewCoordinates(self.coordinates.len()));
        }
        if let Some(index) = self.coordinates.iter().position(|c| !c.is_finite()) {
            return Err(SchemaError::NonFiniteCoordinate { index });
        }
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(SchemaError::InvalidDistance(self.distance));
        }
        if !self.legs.is_empty() {
            let legs: f64 = self.legs.iter().map(|leg| leg.distance).sum();
            let tolerance = LEG_SUM_TOLERANCE_M.max(self.distance * LEG_SUM_TOLERANCE_RATIO);
            if (legs - self.distance).abs() > tolerance {
                return Err(SchemaError::LegDistanceMismatch {
                    legs,
                    route: self.distance,
                });
            }
        }
        Ok(())
    }

    /// Check that the route has geometry and finite totals.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Last coordinate of the route.
    pub fn final_point(&self) -> Option<LatLng> {
        self.coordinates.last().copied()
    }

    /// Check whether any leg carries turn-by-turn steps.
    pub fn has_steps(&self) -> bool {
        self.legs.iter().any(|leg| !leg.steps.is_empty())
    }

    /// Every step across all legs paired with the distance at which it starts.
    pub fn step_starts(&self) -> impl Iterator<Item = (f64, &Step)> {
        self.legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .scan(0.0_f64, |start, step| {
                let at = *start;
                *start += step.distance;
                Some((at, step))
            })
    }

    /// Leg boundaries as `(start, end)` cumulative distances.
    pub fn leg_bounds(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.legs.iter().scan(0.0_f64, |start, leg| {
            let from = *start;
            *start += leg.distance;
            Some((from, *start))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn step(kind: ManeuverType, distance: f64) -> Step {
        Step {
            maneuver_type: kind,
            modifier: None,
            exit_number: None,
            location: LatLng::new(0.0, 0.0),
            distance,
            duration: distance / 10.0,
            name: None,
        }
    }

    fn two_leg_route() -> Route {
        Route {
            coordinates: vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.1)],
            distance: 1000.0,
            duration: 100.0,
            legs: vec![
                Leg {
                    distance: 600.0,
                    duration: 60.0,
                    steps: vec![step(ManeuverType::Depart, 400.0), step(ManeuverType::Turn, 200.0)],
                },
                Leg {
                    distance: 400.0,
                    duration: 40.0,
                    steps: vec![step(ManeuverType::Arrive, 400.0)],
                },
            ],
        }
    }

    #[test]
    fn test_validate_accepts_consistent_route() -> TestResult {
        two_leg_route().validate()?;
        Ok(())
    }

    #[test]
    fn test_validate_rejects_single_point() {
        let mut route = two_leg_route();
        route.coordinates.truncate(1);
        assert_eq!(route.validate(), Err(SchemaError::TooFewCoordinates(1)));
    }

    #[test]
    fn test_validate_rejects_non_finite_point() {
        let mut route = two_leg_route();
        route.coordinates.push(LatLng::new(f64::NAN, 1.0));
        assert_eq!(
            route.validate(),
            Err(SchemaError::NonFiniteCoordinate { index: 2 })
        );
    }

    #[test]
    fn test_validate_rejects_leg_mismatch() {
        let mut route = two_leg_route();
        route.distance = 2000.0;
        assert!(matches!(
            route.validate(),
            Err(SchemaError::LegDistanceMismatch { .. })
        ));
    }

    #[test]
    fn test_step_starts_are_cumulative_across_legs() {
        let route = two_leg_route();
        let starts: Vec<f64> = route.step_starts().map(|(at, _)| at).collect();
        assert_eq!(starts.len(), 3);
        assert!((starts[0] - 0.0).abs() < 1e-9);
        assert!((starts[1] - 400.0).abs() < 1e-9);
        assert!((starts[2] - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_maneuver_type_uses_provider_names() -> TestResult {
        let parsed: ManeuverType = serde_json::from_str("\"end of road\"")?;
        assert_eq!(parsed, ManeuverType::EndOfRoad);
        let unknown: ManeuverType = serde_json::from_str("\"teleport\"")?;
        assert_eq!(unknown, ManeuverType::Other);
        assert_eq!(serde_json::to_string(&ManeuverType::UTurn)?, "\"u_turn\"");
        Ok(())
    }

    #[test]
    fn test_step_serializes_camel_case() -> TestResult {
        let mut s = step(ManeuverType::Roundabout, 50.0);
        s.exit_number = Some(2);
        s.modifier = Some(Modifier::SlightRight);
        let json = serde_json::to_value(&s)?;
        assert_eq!(json["maneuverType"], "roundabout");
        assert_eq!(json["exitNumber"], 2);
        assert_eq!(json["modifier"], "slight right");
        Ok(())
    }
}
