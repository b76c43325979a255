//! Padded bounding region for framing a route on a map.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

/// Default inflation applied to the raw extent.
pub const DEFAULT_PADDING: f64 = 1.2;

/// Smallest span, in degrees, on either axis.
pub const MIN_REGION_SPAN: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub lat_delta: f64,
    pub lng_delta: f64,
}

/// A center point and the extent around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub center: Coordinate,
    pub span: Span,
}

impl Region {
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (coordinate.lat - self.center.lat).abs() <= self.span.lat_delta / 2.0
            && (coordinate.lng - self.center.lng).abs() <= self.span.lng_delta / 2.0
    }
}

/// Region covering every coordinate, with each span multiplied by
/// `padding` and floored at [`MIN_REGION_SPAN`].
///
/// Returns `None` for an empty slice.
pub fn bounding_region(coordinates: &[Coordinate], padding: f64) -> Option<Region> {
    let first = coordinates.first()?;

    let (mut min_lat, mut max_lat) = (first.lat, first.lat);
    let (mut min_lng, mut max_lng) = (first.lng, first.lng);
    for c in &coordinates[1..] {
        min_lat = min_lat.min(c.lat);
        max_lat = max_lat.max(c.lat);
        min_lng = min_lng.min(c.lng);
        max_lng = max_lng.max(c.lng);
    }

    Some(Region {
        center: Coordinate::new((min_lat + max_lat) / 2.0, (min_lng + max_lng) / 2.0),
        span: Span {
            lat_delta: ((max_lat - min_lat) * padding).max(MIN_REGION_SPAN),
            lng_delta: ((max_lng - min_lng) * padding).max(MIN_REGION_SPAN),
        },
    })
}
