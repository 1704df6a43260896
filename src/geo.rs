//! Great-circle geometry on a spherical Earth

use crate::errors::SightingError;
use crate::models::Coordinate;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Validate a latitude/longitude pair
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<Coordinate, SightingError> {
    Coordinate::new(lat, lon)
}

/// Great-circle distance between two coordinates in kilometers
///
/// Uses the haversine formula. Differences are taken as absolute values so the
/// result is bit-for-bit symmetric in its arguments.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let dlat = (b.lat() - a.lat()).abs().to_radians();
    let dlon = (b.lon() - a.lon()).abs().to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Initial bearing of the great-circle path from `from` to `to`
///
/// Degrees clockwise from true north in [0, 360). Identical points have no
/// defined direction and yield 0.
pub fn bearing_degrees(from: Coordinate, to: Coordinate) -> f64 {
    if from == to {
        return 0.0;
    }

    let lat1 = from.lat().to_radians();
    let lat2 = to.lat().to_radians();
    let dlon = (to.lon() - from.lon()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Reduce an angle into [0, 360)
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid of a tiny negative value rounds up to exactly 360
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}
