//! Collaborator seams for route capture.
//!
//! The position sensor and route store live outside this crate. Concrete
//! apps implement these traits over their platform location API and their
//! backend.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::error::{Error, StoreError};

/// Caller-supplied identifier for a tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Location permission as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    #[default]
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

/// Desired fix accuracy passed to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyHint {
    #[default]
    Best,
    NearestTenMeters,
    HundredMeters,
}

/// A single position sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters. Negative means invalid.
    pub accuracy_m: f64,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
}

/// Events delivered by the sensor on the tracker's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Fix(Fix),
    AuthorizationChanged(AuthorizationState),
    /// Transient delivery failure, e.g. no satellite lock.
    Error(String),
}

/// The device location source.
///
/// Methods are fire-and-forget: results (fixes, authorization answers,
/// errors) arrive later as [`SensorEvent`]s.
pub trait PositionSensor: Send + Sync + 'static {
    /// Ask the user/OS for permission. May never be answered.
    fn request_authorization(&self);

    fn authorization_state(&self) -> AuthorizationState;

    /// Begin delivering fixes. Movement filtering below `min_movement_m`
    /// happens in the sensor.
    fn start_updates(&self, accuracy: AccuracyHint, min_movement_m: f64) -> Result<(), Error>;

    fn stop_updates(&self);
}

/// Durable storage for route points and session aggregates.
///
/// `append_points` may be called again with points it already stored (a
/// retried flush); implementations must tolerate the overlap.
#[async_trait]
pub trait RouteStore: Send + Sync + 'static {
    async fn append_points(
        &self,
        session_id: &SessionId,
        points: &[Coordinate],
    ) -> Result<(), StoreError>;

    /// Record the latest position and cumulative distance in meters.
    async fn update_session_aggregate(
        &self,
        session_id: &SessionId,
        last_coordinate: Coordinate,
        total_distance_m: f64,
    ) -> Result<(), StoreError>;
}
