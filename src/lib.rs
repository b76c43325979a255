//! route-capture core
//!
//! GPS route capture for tracked sessions: a polyline codec with geometry
//! helpers, and a route tracker that buffers live fixes, flushes them to a
//! store, and compresses the finished route.

pub mod coordinate;
pub mod error;
pub mod haversine;
pub mod http_store;
pub mod polyline;
pub mod region;
pub mod simplify;
pub mod tracker;
pub mod traits;

pub use coordinate::Coordinate;
pub use error::{Error, StoreError};
pub use polyline::Polyline;
pub use tracker::{RouteTracker, SessionAggregate, TrackerConfig, TrackerPhase};
