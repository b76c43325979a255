//! Great-circle route distance.
//!
//! Uses the haversine formula on a spherical Earth. Good to well under a
//! percent for the short hops between consecutive GPS fixes.

use crate::coordinate::Coordinate;

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate haversine distance between two points in meters.
pub fn haversine_m(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let c = 2.0 * a.min(1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Total distance along a path in meters.
///
/// Empty and single-point paths have zero length.
pub fn calculate_distance(coordinates: &[Coordinate]) -> f64 {
    coordinates
        .windows(2)
        .map(|pair| haversine_m(pair[0], pair[1]))
        .sum()
}
