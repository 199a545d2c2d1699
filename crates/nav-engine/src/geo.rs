//! Spherical geometry helpers.

use convoy_schemas::LatLng;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(from: LatLng, to: LatLng) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_phi = (to.latitude - from.latitude).to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing in degrees, `[0, 360)` clockwise from north.
pub fn bearing_deg(from: LatLng, to: LatLng) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Signed turn from `from` to `to`, normalized to `(-180, 180]`. Positive turns right.
pub fn bearing_delta(from: f64, to: f64) -> f64 {
    let mut diff = (to - from) % 360.0;
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff <= -180.0 {
        diff += 360.0;
    }
    diff
}

/// Linear interpolation in coordinate space.
pub fn interpolate(from: LatLng, to: LatLng, fraction: f64) -> LatLng {
    LatLng::new(
        from.latitude + (to.latitude - from.latitude) * fraction,
        from.longitude + (to.longitude - from.longitude) * fraction,
    )
}

/// Length of a polyline in meters.
pub fn polyline_length_m(points: &[LatLng]) -> f64 {
    points.windows(2).map(|w| match w {
        [a, b] => haversine_m(*a, *b),
        _ => 0.0,
    }).sum()
}
