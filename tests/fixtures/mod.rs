//! Test fixtures for route-capture.
//!
//! Provides:
//! - A scriptable position sensor and an in-memory route store
//! - A harness wiring both into a tracker with its event channel

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use route_capture::traits::{
    AccuracyHint, AuthorizationState, Fix, PositionSensor, RouteStore, SensorEvent, SessionId,
};
use route_capture::{Coordinate, Error, RouteTracker, StoreError, TrackerConfig};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Sensor
// ============================================================================

#[derive(Default)]
struct SensorInner {
    authorization: Mutex<AuthorizationState>,
    authorization_requests: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
    fail_start: AtomicBool,
    last_start: Mutex<Option<(AccuracyHint, f64)>>,
}

/// Position sensor whose state is set by the test.
#[derive(Clone, Default)]
pub struct MockSensor {
    inner: Arc<SensorInner>,
}

impl MockSensor {
    pub fn with_authorization(state: AuthorizationState) -> Self {
        let sensor = Self::default();
        sensor.set_authorization(state);
        sensor
    }

    pub fn set_authorization(&self, state: AuthorizationState) {
        *self.inner.authorization.lock().unwrap() = state;
    }

    pub fn fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn authorization_requests(&self) -> usize {
        self.inner.authorization_requests.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn last_start(&self) -> Option<(AccuracyHint, f64)> {
        *self.inner.last_start.lock().unwrap()
    }
}

impl PositionSensor for MockSensor {
    fn request_authorization(&self) {
        self.inner.authorization_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn authorization_state(&self) -> AuthorizationState {
        *self.inner.authorization.lock().unwrap()
    }

    fn start_updates(&self, accuracy: AccuracyHint, min_movement_m: f64) -> Result<(), Error> {
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_start.lock().unwrap() = Some((accuracy, min_movement_m));
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(Error::SensorUnavailable("location services off".to_string()));
        }
        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_updates(&self) {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct StoreInner {
    appends: Mutex<Vec<(SessionId, Vec<Coordinate>)>>,
    aggregates: Mutex<Vec<(SessionId, Coordinate, f64)>>,
    fail_appends: AtomicBool,
    fail_aggregates: AtomicBool,
    append_delay: Mutex<Option<Duration>>,
}

/// Route store that records every call.
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<StoreInner>,
}

impl MockStore {
    pub fn fail_appends(&self, fail: bool) {
        self.inner.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_aggregates(&self, fail: bool) {
        self.inner.fail_aggregates.store(fail, Ordering::SeqCst);
    }

    pub fn set_append_delay(&self, delay: Option<Duration>) {
        *self.inner.append_delay.lock().unwrap() = delay;
    }

    /// Successful append calls.
    pub fn append_calls(&self) -> usize {
        self.inner.appends.lock().unwrap().len()
    }

    /// Every point stored, in order, across all appends.
    pub fn stored_points(&self) -> Vec<Coordinate> {
        self.inner
            .appends
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, points)| points.iter().copied())
            .collect()
    }

    pub fn appended_sessions(&self) -> Vec<SessionId> {
        self.inner
            .appends
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn last_aggregate(&self) -> Option<(SessionId, Coordinate, f64)> {
        self.inner.aggregates.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RouteStore for MockStore {
    async fn append_points(
        &self,
        session_id: &SessionId,
        points: &[Coordinate],
    ) -> Result<(), StoreError> {
        let delay = *self.inner.append_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("backend unavailable".to_string()));
        }
        self.inner
            .appends
            .lock()
            .unwrap()
            .push((session_id.clone(), points.to_vec()));
        Ok(())
    }

    async fn update_session_aggregate(
        &self,
        session_id: &SessionId,
        last_coordinate: Coordinate,
        total_distance_m: f64,
    ) -> Result<(), StoreError> {
        if self.inner.fail_aggregates.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("backend unavailable".to_string()));
        }
        self.inner
            .aggregates
            .lock()
            .unwrap()
            .push((session_id.clone(), last_coordinate, total_distance_m));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub tracker: RouteTracker<MockSensor, MockStore>,
    pub sensor: MockSensor,
    pub store: MockStore,
    pub events: mpsc::UnboundedSender<SensorEvent>,
}

impl Harness {
    pub fn send(&self, event: SensorEvent) {
        self.events.send(event).expect("tracker pump alive");
    }

    /// Sends an event and waits for the pump to apply it.
    pub async fn deliver(&self, event: SensorEvent) {
        self.send(event);
        settle().await;
    }
}

pub fn harness(authorization: AuthorizationState) -> Harness {
    harness_with_config(authorization, TrackerConfig::default())
}

pub fn harness_with_config(authorization: AuthorizationState, config: TrackerConfig) -> Harness {
    init_tracing();
    let sensor = MockSensor::with_authorization(authorization);
    let store = MockStore::default();
    let (events, rx) = mpsc::unbounded_channel();
    let tracker = RouteTracker::new(sensor.clone(), store.clone(), rx, config);
    Harness {
        tracker,
        sensor,
        store,
        events,
    }
}

/// Lets spawned tasks run. Under paused time this advances the clock by
/// one millisecond only once every task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn fix(lat: f64, lng: f64, accuracy_m: f64) -> SensorEvent {
    SensorEvent::Fix(Fix {
        coordinate: Coordinate::new(lat, lng),
        accuracy_m,
        timestamp_ms: 0,
    })
}
