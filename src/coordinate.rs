//! Geographic coordinate value type.

use serde::{Deserialize, Serialize};

/// A (latitude, longitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and inside the valid
    /// latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(c: Coordinate) -> Self {
        (c.lat, c.lng)
    }
}
