//! Ramer-Douglas-Peucker route simplification.
//!
//! Distances are measured in degrees on the plane, treating lat/lng as
//! Cartesian. Tolerances are a few meters, far below where Earth curvature
//! matters.

use crate::coordinate::Coordinate;

/// Default tolerance in degrees (~5.5 m at the equator).
pub const DEFAULT_TOLERANCE: f64 = 0.00005;

/// Simplify a path so that no dropped point lies farther than `tolerance`
/// degrees from the simplified path.
///
/// Paths of two points or fewer are returned unchanged. Negative and NaN
/// tolerances behave like zero.
pub fn simplify(coordinates: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    if coordinates.len() <= 2 {
        return coordinates.to_vec();
    }
    let tolerance = tolerance.max(0.0);

    let mut out = Vec::with_capacity(coordinates.len());
    simplify_into(coordinates, tolerance, &mut out);
    out
}

/// Appends the simplification of `segment` to `out`, including both ends.
fn simplify_into(segment: &[Coordinate], tolerance: f64, out: &mut Vec<Coordinate>) {
    let first = segment[0];
    let last = segment[segment.len() - 1];

    let mut max_distance = 0.0;
    let mut split = 0;
    for (index, point) in segment.iter().enumerate().take(segment.len() - 1).skip(1) {
        let distance = perpendicular_distance(*point, first, last);
        if distance > max_distance {
            max_distance = distance;
            split = index;
        }
    }

    if split > 0 && max_distance > tolerance {
        simplify_into(&segment[..=split], tolerance, out);
        // The split point closes the left half and opens the right one.
        out.pop();
        simplify_into(&segment[split..], tolerance, out);
    } else {
        out.push(first);
        out.push(last);
    }
}

/// Distance from `point` to the segment `start`-`end`, in degrees.
///
/// The projection is clamped to the segment, so points beyond either end
/// measure to that endpoint.
pub fn perpendicular_distance(point: Coordinate, start: Coordinate, end: Coordinate) -> f64 {
    let dx = end.lng - start.lng;
    let dy = end.lat - start.lat;
    let length_sq = dx * dx + dy * dy;

    let (x, y) = if length_sq == 0.0 {
        (start.lng, start.lat)
    } else {
        let t = (((point.lng - start.lng) * dx + (point.lat - start.lat) * dy) / length_sq)
            .clamp(0.0, 1.0);
        (start.lng + t * dx, start.lat + t * dy)
    };

    ((point.lng - x).powi(2) + (point.lat - y).powi(2)).sqrt()
}
