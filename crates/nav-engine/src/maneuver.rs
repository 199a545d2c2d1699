//! Next-maneuver detection.
//!
//! Both lookups are pure functions of the route and the distance travelled on
//! it. Routes with provider steps use the steps; routes without steps fall back
//! to scanning polyline bearings.

use convoy_schemas::{LatLng, ManeuverType, Modifier, Route};

use crate::config::GuidanceConfig;
use crate::geo::{bearing_delta, bearing_deg, haversine_m};

/// Upcoming maneuver relative to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maneuver {
    /// Kind of maneuver.
    pub kind: ManeuverType,
    /// Direction of the maneuver, if any.
    pub modifier: Option<Modifier>,
    /// Roundabout exit to take.
    pub exit_number: Option<u32>,
    /// Meters from the vehicle to the maneuver point.
    pub distance_remaining: f64,
    /// Where the maneuver happens.
    pub location: LatLng,
    /// Signed bearing change, geometric fallback only.
    pub angle: Option<f64>,
}

impl Maneuver {
    fn arrive(location: LatLng, distance_remaining: f64) -> Self {
        Self {
            kind: ManeuverType::Arrive,
            modifier: None,
            exit_number: None,
            distance_remaining: distance_remaining.max(0.0),
            location,
            angle: None,
        }
    }
}

/// Position within the current leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegProgress {
    /// Zero-based index of the current leg.
    pub leg_index: usize,
    /// Number of legs on the route.
    pub leg_count: usize,
    /// Meters left until the end of the leg.
    pub remaining_m: f64,
}

impl LegProgress {
    /// Check whether this is the last leg of the route.
    pub fn is_final(&self) -> bool {
        self.leg_index + 1 >= self.leg_count
    }
}

/// Which leg `travelled` falls into. `None` for routes without legs.
pub fn leg_progress(route: &Route, travelled: f64) -> Option<LegProgress> {
    let leg_count = route.legs.len();
    if leg_count == 0 {
        return None;
    }

    let current = route
        .leg_bounds()
        .enumerate()
        .find(|(_, (_, end))| travelled < *end);

    Some(match current {
        Some((leg_index, (_, end))) => LegProgress {
            leg_index,
            leg_count,
            remaining_m: (end - travelled).max(0.0),
        },
        None => LegProgress {
            leg_index: leg_count - 1,
            leg_count,
            remaining_m: 0.0,
        },
    })
}

/// Next maneuver after `travelled` meters on `route`.
pub fn next_maneuver(route: &Route, travelled: f64, config: &GuidanceConfig) -> Option<Maneuver> {
    if route.coordinates.len() < 2 {
        return None;
    }
    if route.has_steps() {
        maneuver_from_steps(route, travelled, config)
    } else {
        maneuver_from_geometry(route, travelled, config)
    }
}

fn maneuver_from_steps(route: &Route, travelled: f64, config: &GuidanceConfig) -> Option<Maneuver> {
    if let Some((start, step)) = route.step_starts().find(|(start, _)| *start > travelled) {
        return Some(Maneuver {
            kind: step.maneuver_type,
            modifier: step.modifier,
            exit_number: step.exit_number,
            distance_remaining: start - travelled,
            location: step.location,
            angle: None,
        });
    }

    let remaining = route.distance - travelled;
    if remaining < config.arrive_threshold_m {
        return route
            .final_point()
            .map(|end| Maneuver::arrive(end, remaining));
    }
    None
}

/// Bearing scan for routes that carry no steps.
fn maneuver_from_geometry(
    route: &Route,
    travelled: f64,
    config: &GuidanceConfig,
) -> Option<Maneuver> {
    let coords = &route.coordinates;

    // Locate the segment containing `travelled`.
    let mut start_of_segment = 0.0;
    let mut index = None;
    for (i, pair) in coords.windows(2).enumerate() {
        let [a, b] = pair else { continue };
        let length = haversine_m(*a, *b);
        if travelled < start_of_segment + length {
            index = Some((i, length, travelled - start_of_segment));
            break;
        }
        start_of_segment += length;
    }
    let (index, length, into) = match index {
        Some(found) => found,
        None => return route.final_point().map(|end| Maneuver::arrive(end, 0.0)),
    };

    let (Some(a), Some(b)) = (coords.get(index), coords.get(index + 1)) else {
        return None;
    };
    let mut distance = length - into;
    let mut heading = bearing_deg(*a, *b);

    for pair in coords.get(index + 1..).unwrap_or_default().windows(2) {
        let [p1, p2] = pair else { continue };
        let bearing = bearing_deg(*p1, *p2);
        let diff = bearing_delta(heading, bearing);

        if diff.abs() > config.turn_threshold_deg {
            let kind = if diff.abs() > config.u_turn_threshold_deg {
                ManeuverType::UTurn
            } else if diff > 0.0 {
                ManeuverType::TurnRight
            } else {
                ManeuverType::TurnLeft
            };
            return Some(Maneuver {
                kind,
                modifier: None,
                exit_number: None,
                distance_remaining: distance,
                location: *p1,
                angle: Some(diff),
            });
        }

        distance += haversine_m(*p1, *p2);
        heading = bearing;
    }

    route
        .final_point()
        .map(|end| Maneuver::arrive(end, distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_M;
    use convoy_schemas::{Leg, Step};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn deg(m: f64) -> f64 {
        (m / EARTH_RADIUS_M).to_degrees()
    }

    fn step(kind: ManeuverType, distance: f64, at: LatLng) -> Step {
        Step {
            maneuver_type: kind,
            modifier: None,
            exit_number: None,
            location: at,
            distance,
            duration: distance / 10.0,
            name: None,
        }
    }

    fn stepped_route() -> Route {
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(deg(300.0), 0.0);
        let c = LatLng::new(deg(300.0), deg(700.0));
        Route {
            coordinates: vec![a, b, c],
            distance: 1000.0,
            duration: 100.0,
            legs: vec![Leg {
                distance: 1000.0,
                duration: 100.0,
                steps: vec![
                    step(ManeuverType::Depart, 300.0, a),
                    Step {
                        modifier: Some(Modifier::Right),
                        ..step(ManeuverType::Turn, 700.0, b)
                    },
                    step(ManeuverType::Arrive, 0.0, c),
                ],
            }],
        }
    }

    #[test]
    fn test_next_step_maneuver() -> TestResult {
        let route = stepped_route();
        let config = GuidanceConfig::default();
        let m = next_maneuver(&route, 120.0, &config).ok_or("no maneuver")?;
        assert_eq!(m.kind, ManeuverType::Turn);
        assert_eq!(m.modifier, Some(Modifier::Right));
        assert!((m.distance_remaining - 180.0).abs() < 1e-9);

        let m = next_maneuver(&route, 400.0, &config).ok_or("no maneuver")?;
        assert_eq!(m.kind, ManeuverType::Arrive);
        assert!((m.distance_remaining - 600.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_synthesized_arrival_near_end() -> TestResult {
        let mut route = stepped_route();
        if let Some(leg) = route.legs.first_mut() {
            leg.steps.pop();
        }
        let config = GuidanceConfig::default();
        assert!(next_maneuver(&route, 500.0, &config).is_none());

        let m = next_maneuver(&route, 850.0, &config).ok_or("no maneuver")?;
        assert_eq!(m.kind, ManeuverType::Arrive);
        assert!((m.distance_remaining - 150.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_geometric_fallback_detects_right_turn() -> TestResult {
        let mut route = stepped_route();
        route.legs.clear();
        let config = GuidanceConfig::default();
        let m = next_maneuver(&route, 100.0, &config).ok_or("no maneuver")?;
        assert_eq!(m.kind, ManeuverType::TurnRight);
        assert!((m.distance_remaining - 200.0).abs() < 0.01);
        assert!(m.angle.is_some_and(|a| (a - 90.0).abs() < 0.1));
        Ok(())
    }

    #[test]
    fn test_geometric_fallback_u_turn_and_left() -> TestResult {
        let config = GuidanceConfig::default();
        let a = LatLng::new(0.0, 0.0);
        let b = LatLng::new(deg(200.0), 0.0);
        let back = Route {
            coordinates: vec![a, b, LatLng::new(deg(50.0), deg(1.0))],
            distance: 350.0,
            duration: 35.0,
            legs: Vec::new(),
        };
        let m = next_maneuver(&back, 0.0, &config).ok_or("no maneuver")?;
        assert_eq!(m.kind, ManeuverType::UTurn);

        let left = Route {
            coordinates: vec![a, b, LatLng::new(deg(200.0), -deg(300.0))],
            distance: 500.0,
            duration: 50.0,
            legs: Vec::new(),
        };
        let m = next_maneuver(&left, 0.0, &config).ok_or("no maneuver")?;
        assert_eq!(m.kind, ManeuverType::TurnLeft);
        Ok(())
    }

    #[test]
    fn test_leg_progress() -> TestResult {
        let mut route = stepped_route();
        route.legs = vec![
            Leg {
                distance: 600.0,
                duration: 60.0,
                steps: Vec::new(),
            },
            Leg {
                distance: 400.0,
                duration: 40.0,
                steps: Vec::new(),
            },
        ];
        let p = leg_progress(&route, 580.0).ok_or("no legs")?;
        assert_eq!(p.leg_index, 0);
        assert!(!p.is_final());
        assert!((p.remaining_m - 20.0).abs() < 1e-9);

        let p = leg_progress(&route, 700.0).ok_or("no legs")?;
        assert_eq!(p.leg_index, 1);
        assert!(p.is_final());

        let p = leg_progress(&route, 2000.0).ok_or("no legs")?;
        assert_eq!(p.leg_index, 1);
        assert!(p.remaining_m.abs() < f64::EPSILON);
        Ok(())
    }
}
