//! Route tracker: turns a stream of sensor fixes into a stored, compressed
//! route.
//!
//! One tracker owns at most one session at a time. Sensor events are
//! consumed by a pump task in arrival order, a timer task flushes buffered
//! points to the [`RouteStore`] every interval, and [`RouteTracker::stop_tracking`]
//! simplifies and encodes the whole route. All session state sits behind a
//! single mutex; store I/O happens outside it and is applied only if the
//! session that issued it is still current.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinate::Coordinate;
use crate::error::{Error, StoreError};
use crate::haversine::haversine_m;
use crate::polyline::encode;
use crate::simplify::{DEFAULT_TOLERANCE, simplify};
use crate::traits::{
    AccuracyHint, AuthorizationState, Fix, PositionSensor, RouteStore, SensorEvent, SessionId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between periodic flushes to the store.
    pub flush_interval_secs: u64,
    /// Fixes at or above this accuracy radius (meters) are dropped.
    pub max_accuracy_m: f64,
    /// Minimum movement between fixes, enforced by the sensor.
    pub min_movement_m: f64,
    pub accuracy_hint: AccuracyHint,
    /// Simplification tolerance in degrees applied when a session stops.
    pub simplify_tolerance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 30,
            max_accuracy_m: 100.0,
            min_movement_m: 10.0,
            accuracy_hint: AccuracyHint::Best,
            simplify_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl TrackerConfig {
    fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

/// Lifecycle of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    Idle,
    /// Waiting for the user to answer the permission prompt.
    Authorizing,
    Tracking,
    /// Permission denied or restricted. The session stays open but no
    /// fixes arrive until the sensor reports `Authorized` again.
    Blocked,
    Finalizing,
}

/// Running totals for the active session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionAggregate {
    pub total_distance_m: f64,
    pub last_coordinate: Option<Coordinate>,
    pub last_accuracy_m: Option<f64>,
}

struct Session {
    id: SessionId,
    route: Vec<Coordinate>,
    aggregate: SessionAggregate,
    /// Index of the first point the store has not acknowledged.
    flushed: usize,
    timer: CancellationToken,
}

/// Points and totals captured for one store write.
struct FlushBatch {
    session_id: SessionId,
    points: Vec<Coordinate>,
    /// Watermark to apply once `points` are stored.
    end: usize,
    last_coordinate: Option<Coordinate>,
    total_distance_m: f64,
}

enum FlushOutcome {
    Stored,
    /// Points were appended but the aggregate update failed.
    PointsOnly(StoreError),
    Failed(StoreError),
    /// The session ended after the points were appended; totals not sent.
    Superseded,
}

impl Session {
    fn new(id: SessionId, timer: CancellationToken) -> Self {
        Self {
            id,
            route: Vec::new(),
            aggregate: SessionAggregate::default(),
            flushed: 0,
            timer,
        }
    }

    fn record(&mut self, fix: Fix, max_accuracy_m: f64) -> Result<(), Error> {
        let accurate = fix.accuracy_m >= 0.0 && fix.accuracy_m < max_accuracy_m;
        if !accurate || !fix.coordinate.is_valid() {
            return Err(Error::InaccurateFix {
                accuracy_m: fix.accuracy_m,
            });
        }

        if let Some(previous) = self.aggregate.last_coordinate {
            self.aggregate.total_distance_m += haversine_m(previous, fix.coordinate);
        }
        self.route.push(fix.coordinate);
        self.aggregate.last_coordinate = Some(fix.coordinate);
        self.aggregate.last_accuracy_m = Some(fix.accuracy_m);
        Ok(())
    }

    fn pending_batch(&self) -> Option<FlushBatch> {
        if self.route.is_empty() {
            return None;
        }
        Some(FlushBatch {
            session_id: self.id.clone(),
            points: self.route[self.flushed..].to_vec(),
            end: self.route.len(),
            last_coordinate: self.aggregate.last_coordinate,
            total_distance_m: self.aggregate.total_distance_m,
        })
    }
}

struct State {
    phase: TrackerPhase,
    authorization: AuthorizationState,
    last_error: Option<Error>,
    /// Bumped on every start and stop; stale store results compare against it.
    generation: u64,
    session: Option<Session>,
}

struct Shared<S, R> {
    sensor: S,
    store: R,
    config: TrackerConfig,
    state: Mutex<State>,
    /// Held for the whole of a store write so flushes land in order.
    flush_lock: Mutex<()>,
    shutdown: CancellationToken,
}

/// GPS route tracker for one device sensor.
///
/// Must be created inside a Tokio runtime. Dropping it stops the event pump
/// and any running flush timer.
pub struct RouteTracker<S, R> {
    shared: Arc<Shared<S, R>>,
}

impl<S, R> RouteTracker<S, R>
where
    S: PositionSensor,
    R: RouteStore,
{
    /// Creates a tracker reading sensor events from `events`.
    pub fn new(
        sensor: S,
        store: R,
        events: mpsc::UnboundedReceiver<SensorEvent>,
        config: TrackerConfig,
    ) -> Self {
        let authorization = sensor.authorization_state();
        let shared = Arc::new(Shared {
            sensor,
            store,
            config,
            state: Mutex::new(State {
                phase: TrackerPhase::Idle,
                authorization,
                last_error: None,
                generation: 0,
                session: None,
            }),
            flush_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(pump_events(Arc::clone(&shared), events));

        Self { shared }
    }

    pub fn with_defaults(sensor: S, store: R, events: mpsc::UnboundedReceiver<SensorEvent>) -> Self {
        Self::new(sensor, store, events, TrackerConfig::default())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }

    /// Opens a session and starts the flush timer.
    ///
    /// Does nothing if a session is already active. Authorization problems
    /// and sensor start failures show up in [`Self::last_error`].
    pub async fn start_tracking(&self, session_id: impl Into<SessionId>) {
        let session_id = session_id.into();
        let mut state = self.shared.state.lock().await;
        if let Some(active) = &state.session {
            debug!(session = %active.id, requested = %session_id, "session already active, ignoring start");
            return;
        }

        let timer = self.shared.shutdown.child_token();
        state.generation += 1;
        state.last_error = None;
        state.session = Some(Session::new(session_id.clone(), timer.clone()));
        state.authorization = self.shared.sensor.authorization_state();

        match state.authorization {
            AuthorizationState::Authorized => self.shared.begin_updates(&mut state),
            AuthorizationState::NotDetermined => {
                state.phase = TrackerPhase::Authorizing;
                self.shared.sensor.request_authorization();
            }
            AuthorizationState::Denied => {
                state.phase = TrackerPhase::Blocked;
                state.last_error = Some(Error::AuthorizationDenied);
            }
            AuthorizationState::Restricted => {
                state.phase = TrackerPhase::Blocked;
                state.last_error = Some(Error::AuthorizationRestricted);
            }
        }

        let generation = state.generation;
        let phase = state.phase;
        drop(state);

        info!(session = %session_id, ?phase, "tracking started");
        tokio::spawn(run_flush_timer(Arc::clone(&self.shared), generation, timer));
    }

    /// Ends the session and returns the simplified, encoded route.
    ///
    /// Returns an empty string when no session is active. The final flush
    /// of unstored points is awaited before returning; its failure is
    /// recorded as the last error and does not affect the result.
    pub async fn stop_tracking(&self) -> String {
        let (batch, route, generation, session_id) = {
            let mut state = self.shared.state.lock().await;
            let Some(session) = state.session.take() else {
                return String::new();
            };
            session.timer.cancel();
            self.shared.sensor.stop_updates();
            state.generation += 1;
            state.phase = TrackerPhase::Finalizing;

            let batch = session.pending_batch();
            (batch, session.route, state.generation, session.id)
        };

        let simplified = simplify(&route, self.shared.config.simplify_tolerance);
        let encoded = encode(&simplified);
        info!(
            session = %session_id,
            points = route.len(),
            kept = simplified.len(),
            "tracking stopped"
        );

        let failure = match batch {
            Some(batch) => {
                // Waits out any in-flight periodic flush so the final totals land last.
                let _writing = self.shared.flush_lock.lock().await;
                match self.shared.write_batch(&batch, None).await {
                    FlushOutcome::Stored | FlushOutcome::Superseded => None,
                    FlushOutcome::PointsOnly(err) | FlushOutcome::Failed(err) => {
                        warn!(session = %session_id, error = %err, "final flush failed");
                        Some(Error::from(err))
                    }
                }
            }
            None => None,
        };

        let mut state = self.shared.state.lock().await;
        if state.generation == generation {
            state.phase = TrackerPhase::Idle;
            if failure.is_some() {
                state.last_error = failure;
            }
        }

        encoded
    }

    pub async fn is_tracking(&self) -> bool {
        self.shared.state.lock().await.session.is_some()
    }

    pub async fn phase(&self) -> TrackerPhase {
        self.shared.state.lock().await.phase
    }

    /// Totals for the active session, zeroed when idle.
    pub async fn current_aggregate(&self) -> SessionAggregate {
        let state = self.shared.state.lock().await;
        state
            .session
            .as_ref()
            .map(|session| session.aggregate)
            .unwrap_or_default()
    }

    pub async fn last_error(&self) -> Option<Error> {
        self.shared.state.lock().await.last_error.clone()
    }

    pub async fn authorization_state(&self) -> AuthorizationState {
        self.shared.state.lock().await.authorization
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        let state = self.shared.state.lock().await;
        state.session.as_ref().map(|session| session.id.clone())
    }

    /// Number of points in the active route.
    pub async fn buffered_points(&self) -> usize {
        let state = self.shared.state.lock().await;
        state.session.as_ref().map_or(0, |session| session.route.len())
    }

    /// Number of points not yet acknowledged by the store.
    pub async fn unflushed_points(&self) -> usize {
        let state = self.shared.state.lock().await;
        state
            .session
            .as_ref()
            .map_or(0, |session| session.route.len() - session.flushed)
    }
}

impl<S, R> Drop for RouteTracker<S, R> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl<S, R> Shared<S, R>
where
    S: PositionSensor,
    R: RouteStore,
{
    fn begin_updates(&self, state: &mut State) {
        state.phase = TrackerPhase::Tracking;
        if let Err(err) = self
            .sensor
            .start_updates(self.config.accuracy_hint, self.config.min_movement_m)
        {
            warn!(error = %err, "sensor failed to start");
            state.last_error = Some(err);
        }
    }

    async fn handle_event(&self, event: SensorEvent) {
        let mut state = self.state.lock().await;
        match event {
            SensorEvent::Fix(fix) => {
                let max_accuracy_m = self.config.max_accuracy_m;
                let Some(session) = state.session.as_mut() else {
                    debug!("fix received while idle, dropped");
                    return;
                };
                if let Err(err) = session.record(fix, max_accuracy_m) {
                    debug!(session = %session.id, error = %err, "fix filtered");
                }
            }
            SensorEvent::AuthorizationChanged(authorization) => {
                self.authorization_changed(&mut state, authorization);
            }
            SensorEvent::Error(message) => {
                warn!(%message, "sensor error");
                state.last_error = Some(Error::SensorUnavailable(message));
            }
        }
    }

    fn authorization_changed(&self, state: &mut State, authorization: AuthorizationState) {
        state.authorization = authorization;
        if state.session.is_none() {
            return;
        }

        match authorization {
            AuthorizationState::Authorized => {
                if matches!(state.phase, TrackerPhase::Authorizing | TrackerPhase::Blocked) {
                    if state.last_error.as_ref().is_some_and(Error::is_authorization) {
                        state.last_error = None;
                    }
                    info!("location authorized, starting updates");
                    self.begin_updates(state);
                }
            }
            AuthorizationState::Denied => {
                warn!("location authorization denied");
                state.phase = TrackerPhase::Blocked;
                state.last_error = Some(Error::AuthorizationDenied);
            }
            AuthorizationState::Restricted => {
                warn!("location authorization restricted");
                state.phase = TrackerPhase::Blocked;
                state.last_error = Some(Error::AuthorizationRestricted);
            }
            AuthorizationState::NotDetermined => {}
        }
    }

    /// Periodic flush for the session identified by `generation`.
    async fn flush(&self, generation: u64) {
        let _writing = self.flush_lock.lock().await;
        let batch = {
            let state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            match state.session.as_ref().and_then(Session::pending_batch) {
                Some(batch) => batch,
                None => return,
            }
        };

        let outcome = self.write_batch(&batch, Some(generation)).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(session = %batch.session_id, "session ended during flush, result discarded");
            return;
        }
        let State {
            session,
            last_error,
            ..
        } = &mut *state;
        let Some(session) = session.as_mut() else {
            return;
        };

        match outcome {
            FlushOutcome::Stored => {
                session.flushed = session.flushed.max(batch.end);
                if matches!(last_error, Some(Error::StorePersistFailed(_))) {
                    *last_error = None;
                }
                debug!(session = %session.id, points = batch.points.len(), "flushed");
            }
            FlushOutcome::PointsOnly(err) => {
                session.flushed = session.flushed.max(batch.end);
                warn!(session = %session.id, error = %err, "aggregate update failed, will retry");
                *last_error = Some(err.into());
            }
            FlushOutcome::Failed(err) => {
                warn!(session = %session.id, error = %err, "flush failed, will retry");
                *last_error = Some(err.into());
            }
            FlushOutcome::Superseded => {}
        }
    }

    /// Appends the batch points, then reports the totals. Callers hold
    /// `flush_lock`.
    ///
    /// With `generation` set, the totals are skipped if that session ended
    /// while the append was in flight, so stale numbers never overwrite the
    /// final report.
    async fn write_batch(&self, batch: &FlushBatch, generation: Option<u64>) -> FlushOutcome {
        if !batch.points.is_empty() {
            if let Err(err) = self.store.append_points(&batch.session_id, &batch.points).await {
                return FlushOutcome::Failed(err);
            }
        }

        if let Some(generation) = generation {
            if self.state.lock().await.generation != generation {
                debug!(session = %batch.session_id, "session ended during flush, totals not sent");
                return FlushOutcome::Superseded;
            }
        }

        let Some(last_coordinate) = batch.last_coordinate else {
            return FlushOutcome::Stored;
        };
        match self
            .store
            .update_session_aggregate(&batch.session_id, last_coordinate, batch.total_distance_m)
            .await
        {
            Ok(()) => FlushOutcome::Stored,
            Err(err) if batch.points.is_empty() => FlushOutcome::Failed(err),
            Err(err) => FlushOutcome::PointsOnly(err),
        }
    }
}

async fn pump_events<S, R>(shared: Arc<Shared<S, R>>, mut events: mpsc::UnboundedReceiver<SensorEvent>)
where
    S: PositionSensor,
    R: RouteStore,
{
    loop {
        tokio::select! {
            biased;

            _ = shared.shutdown.cancelled() => break,

            event = events.recv() => {
                let Some(event) = event else { break };
                shared.handle_event(event).await;
            }
        }
    }

    debug!("sensor event pump stopped");
}

async fn run_flush_timer<S, R>(shared: Arc<Shared<S, R>>, generation: u64, cancel: CancellationToken)
where
    S: PositionSensor,
    R: RouteStore,
{
    let period = shared.config.flush_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => shared.flush(generation).await,
        }
    }
}
