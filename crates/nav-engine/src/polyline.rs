//! Encoded polyline decoding (precision 5).

use convoy_schemas::LatLng;

use crate::error::{RouteError, RouteResult};

/// Digits of precision used by OSRM `geometries=polyline`.
pub const PRECISION: u32 = 5;

/// Decode an encoded polyline string into coordinates.
pub fn decode(encoded: &str) -> RouteResult<Vec<LatLng>> {
    let line = ::polyline::decode_polyline(encoded, PRECISION)
        .map_err(|e| RouteError::InvalidPolyline(e.to_string()))?;
    Ok(line
        .0
        .into_iter()
        .map(|coord| LatLng::new(coord.y, coord.x))
        .collect())
}
