//! Camera behaviour for mirrored positions.

use convoy_nav_engine::geo::haversine_m;
use convoy_schemas::{LatLng, Place};
use serde::{Deserialize, Serialize};

/// How the map camera should follow a mirrored position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "directive")]
pub enum CameraDirective {
    /// Leave the camera where the user put it.
    Suppress,
    /// Jump without animation.
    Snap { to: LatLng },
    /// Ease toward the new position.
    Animate { to: LatLng },
}

/// Decide how the camera follows a mirrored position update.
///
/// A selected place counts as unrelated when it is neither the destination nor
/// one of the waypoints; while one is open the camera stays put.
pub fn camera_directive(
    previous: Option<LatLng>,
    next: LatLng,
    selected: Option<&Place>,
    trip_stops: &[&Place],
    snap_distance_m: f64,
) -> CameraDirective {
    if let Some(selected) = selected {
        if !trip_stops.iter().any(|stop| *stop == selected) {
            return CameraDirective::Suppress;
        }
    }
    match previous {
        Some(previous) if haversine_m(previous, next) <= snap_distance_m => {
            CameraDirective::Animate { to: next }
        }
        _ => CameraDirective::Snap { to: next },
    }
}
