//! Polyline codec for route geometries.
//!
//! Implements the standard encoded polyline format: coordinates scaled to
//! five decimal digits, delta-encoded against the previous point, zig-zag
//! signed, and written as 5-bit chunks offset by 63 with 0x20 as the
//! continuation bit. Output is byte-compatible with third-party mapping
//! tools.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::Error;
use crate::haversine::calculate_distance;
use crate::region::{bounding_region, Region};
use crate::simplify::simplify;

/// Fixed-point scale (five decimal digits, ~1.1 m at the equator).
const PRECISION: f64 = 1e5;

/// ASCII offset added to every emitted chunk.
const CHAR_OFFSET: u8 = 63;

/// Continuation bit on every chunk but the last.
const CONTINUATION: u64 = 0x20;

const CHUNK_MASK: u64 = 0x1f;

/// Encode a coordinate sequence into a polyline string.
///
/// Empty input yields an empty string. Deltas accumulate in integers, so
/// there is no floating-point drift across points.
///
/// Points that fail [`Coordinate::is_valid`] (non-finite or out of range)
/// are skipped, so the output only ever holds real positions.
pub fn encode(coordinates: &[Coordinate]) -> String {
    let mut out = String::with_capacity(coordinates.len() * 8);
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;

    for coordinate in coordinates.iter().filter(|c| c.is_valid()) {
        let lat = scale(coordinate.lat);
        let lng = scale(coordinate.lng);
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

/// Decode a polyline string, keeping every complete point.
///
/// Truncated or corrupted input stops the walk at the last complete
/// (lat, lng) pair. Never panics.
pub fn decode(encoded: &str) -> Vec<Coordinate> {
    let mut points = Vec::new();
    let _ = decode_into(encoded.as_bytes(), &mut points);
    points
}

/// Decode a polyline string, failing on any malformed byte.
///
/// Returns [`Error::MalformedEncodedRoute`] with the byte offset of the
/// problem for truncated values, a latitude without its longitude, bytes
/// outside the polyline alphabet, or values that overflow.
pub fn decode_strict(encoded: &str) -> Result<Vec<Coordinate>, Error> {
    let mut points = Vec::new();
    decode_into(encoded.as_bytes(), &mut points)?;
    Ok(points)
}

fn decode_into(bytes: &[u8], points: &mut Vec<Coordinate>) -> Result<(), Error> {
    let mut index = 0;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while index < bytes.len() {
        let dlat = decode_value(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(Error::MalformedEncodedRoute { position: index });
        }
        let dlng = decode_value(bytes, &mut index)?;

        lat = lat
            .checked_add(dlat)
            .ok_or(Error::MalformedEncodedRoute { position: index })?;
        lng = lng
            .checked_add(dlng)
            .ok_or(Error::MalformedEncodedRoute { position: index })?;
        points.push(Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(())
}

fn scale(degrees: f64) -> i64 {
    (degrees * PRECISION).round() as i64
}

fn encode_value(value: i64, out: &mut String) {
    let mut v = (value << 1) as u64;
    if value < 0 {
        v = !v;
    }
    while v >= CONTINUATION {
        out.push((((v & CHUNK_MASK) | CONTINUATION) as u8 + CHAR_OFFSET) as char);
        v >>= 5;
    }
    out.push((v as u8 + CHAR_OFFSET) as char);
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64, Error> {
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(Error::MalformedEncodedRoute { position: *index });
        };
        if !(CHAR_OFFSET..=126).contains(&byte) || shift >= 64 {
            return Err(Error::MalformedEncodedRoute { position: *index });
        }
        *index += 1;

        let chunk = (byte - CHAR_OFFSET) as u64;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk < CONTINUATION {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1) as i64
    } else {
        (result >> 1) as i64
    };
    Ok(value)
}

/// A polyline representing a route geometry as decoded coordinates.
///
/// Stores points directly for processing; use [`Polyline::encode`] and
/// [`Polyline::decode`] at storage and transport boundaries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Coordinate>,
}

impl Polyline {
    /// Creates a new Polyline from decoded coordinate points.
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    /// Best-effort decode, see [`decode`].
    pub fn decode(encoded: &str) -> Self {
        Self::new(decode(encoded))
    }

    /// Strict decode, see [`decode_strict`].
    pub fn decode_strict(encoded: &str) -> Result<Self, Error> {
        decode_strict(encoded).map(Self::new)
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn encode(&self) -> String {
        encode(&self.points)
    }

    /// Simplified copy within `tolerance` degrees.
    pub fn simplify(&self, tolerance: f64) -> Self {
        Self::new(simplify(&self.points, tolerance))
    }

    /// Path length in meters.
    pub fn distance_m(&self) -> f64 {
        calculate_distance(&self.points)
    }

    pub fn bounding_region(&self, padding: f64) -> Option<Region> {
        bounding_region(&self.points, padding)
    }
}

impl From<Vec<Coordinate>> for Polyline {
    fn from(points: Vec<Coordinate>) -> Self {
        Self::new(points)
    }
}
