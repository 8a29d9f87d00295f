//! ==============================================================================
//! scheduler.rs - multi-device poll scheduler
//! ==============================================================================
//!
//! purpose:
//!     owns the set of tracked devices for a monitoring session and drives
//!     refresh cycles across all of them.
//!
//! state machine:
//!
//! ```text
//!     Idle ──start(ids)──> Active ──stop()──> Stopped
//!      ^                                          │
//!      └──────────── start(new ids) ──────────────┘
//!
//!     start() with an empty set fails and leaves the scheduler as it was.
//!     starting a new session stops the previous one.
//! ```
//!
//! one cycle:
//!
//! ```text
//!     cycle() ──spawn──> [fetch pot A] ──render(A)──┐
//!             ──spawn──> [fetch pot B] ──render(B)──┼──> TrackedSet (Arc swap)
//!             ──spawn──> [fetch pot C] ──render(C)──┘
//!
//!     every device runs in its own task and renders the moment it is done,
//!     so a slow or failing pot never holds up its siblings. each fetch is
//!     bounded by the fetch timeout (plus a small grace), which bounds the
//!     whole cycle.
//! ```
//!
//! cadence:
//!     the scheduler never loops on its own. callers either call cycle()
//!     whenever they like, or hand the session to run_every()/spawn_every().
//!
//! cancellation:
//!     stop() takes the render gate for writing, so it waits for any render
//!     already in progress, flips the state and wakes every in-flight fetch.
//!     once it returns the sink is never called again for that session.
//!
//! ==============================================================================

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{now_ms, DeviceId, PollOutcome, TrackedSet};
use crate::error::{FailureKind, SchedulerError};
use crate::fetcher::TelemetrySource;
use crate::sink::RenderSink;

/// extra time a source gets beyond the fetch timeout before the scheduler
/// gives up on it
pub const FETCH_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// no device set registered
    Idle,
    Active,
    Stopped,
}

/// creates monitoring sessions; holds at most one live session
pub struct PollScheduler {
    source: Arc<dyn TelemetrySource>,
    sink: Arc<dyn RenderSink>,
    fetch_timeout: Duration,
    current: Mutex<Option<SessionHandle>>,
    sessions: AtomicU64,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        sink: Arc<dyn RenderSink>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            fetch_timeout,
            current: Mutex::new(None),
            sessions: AtomicU64::new(0),
        }
    }

    /// state of the most recent session, Idle if none was started
    pub fn state(&self) -> SchedulerState {
        self.current.lock().as_ref().map_or(SchedulerState::Idle, SessionHandle::state)
    }

    /// the most recent session, running or stopped
    pub fn session(&self) -> Option<SessionHandle> {
        self.current.lock().clone()
    }

    /// register `ids` and run the first cycle
    ///
    /// duplicates are dropped (first occurrence wins). an empty set is
    /// rejected before anything else happens.
    pub async fn start<I, D>(&self, ids: I) -> Result<SessionHandle, SchedulerError>
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        let mut seen = HashSet::new();
        let devices: Vec<DeviceId> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if devices.is_empty() {
            tracing::warn!("refusing to start monitoring without devices");
            return Err(SchedulerError::InvalidConfiguration(
                "no device ids to monitor".to_string(),
            ));
        }

        let number = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        let session = SessionHandle::new(
            number,
            devices,
            self.source.clone(),
            self.sink.clone(),
            self.fetch_timeout,
        );

        if let Some(previous) = self.current.lock().replace(session.clone()) {
            previous.stop();
        }

        tracing::info!(session = number, devices = session.devices().len(), "monitoring started");
        session.cycle().await?;
        Ok(session)
    }

    /// stop the current session, if any
    pub fn stop(&self) {
        if let Some(session) = self.current.lock().as_ref() {
            session.stop();
        }
    }
}

struct Session {
    number: u64,
    devices: Vec<DeviceId>,
    source: Arc<dyn TelemetrySource>,
    sink: Arc<dyn RenderSink>,
    fetch_timeout: Duration,
    // renders hold it for reading, stop() for writing
    gate: RwLock<SchedulerState>,
    stop_tx: watch::Sender<bool>,
    tracked: RwLock<Arc<TrackedSet>>,
    cycles: AtomicU64,
    running: tokio::sync::Mutex<()>,
}

/// cheap, cloneable handle to one monitoring session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Session>,
}

impl SessionHandle {
    fn new(
        number: u64,
        devices: Vec<DeviceId>,
        source: Arc<dyn TelemetrySource>,
        sink: Arc<dyn RenderSink>,
        fetch_timeout: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Session {
                number,
                devices,
                source,
                sink,
                fetch_timeout,
                gate: RwLock::new(SchedulerState::Active),
                stop_tx,
                tracked: RwLock::new(Arc::new(TrackedSet::default())),
                cycles: AtomicU64::new(0),
                running: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn number(&self) -> u64 {
        self.inner.number
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.inner.devices
    }

    /// never touches the render gate, so sinks may call it while rendering
    pub fn state(&self) -> SchedulerState {
        if *self.inner.stop_tx.borrow() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Active
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == SchedulerState::Stopped
    }

    /// outcomes of the last completed cycle, empty once stopped
    pub fn tracked(&self) -> Arc<TrackedSet> {
        self.inner.tracked.read().clone()
    }

    /// poll every device once and replace the tracked set
    ///
    /// never looks at the previous tracked set. concurrent calls on the same
    /// session run one after the other.
    pub async fn cycle(&self) -> Result<Arc<TrackedSet>, SchedulerError> {
        let _running = self.inner.running.lock().await;
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }

        let cycle = self.inner.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session = self.inner.number, cycle, "cycle started");

        let tasks: Vec<(DeviceId, JoinHandle<Option<PollOutcome>>)> = self
            .inner
            .devices
            .iter()
            .map(|device| {
                let session = self.inner.clone();
                let id = device.clone();
                (device.clone(), tokio::spawn(async move { session.poll_device(&id).await }))
            })
            .collect();

        let mut outcomes = BTreeMap::new();
        for (device, task) in tasks {
            match task.await {
                Ok(Some(outcome)) => {
                    outcomes.insert(device, outcome);
                }
                // stopped while in flight
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        device = %device,
                        kind = %FailureKind::ProcessingError,
                        error = %e,
                        "device task failed"
                    );
                    let outcome = PollOutcome::failed(FailureKind::ProcessingError, &device);
                    if self.inner.render(&device, &outcome) {
                        outcomes.insert(device, outcome);
                    }
                }
            }
        }

        // hold the gate so a concurrent stop() cannot land between check and swap
        let gate = self.inner.gate.read();
        if *gate == SchedulerState::Stopped {
            return Err(SchedulerError::Stopped);
        }

        let tracked = Arc::new(TrackedSet { cycle, completed_at_ms: now_ms(), outcomes });
        *self.inner.tracked.write() = tracked.clone();
        drop(gate);

        let failed = tracked.outcomes.values().filter(|o| o.failure_kind().is_some()).count();
        tracing::debug!(
            session = self.inner.number,
            cycle,
            devices = tracked.len(),
            failed,
            "cycle finished"
        );
        Ok(tracked)
    }

    /// no further cycles or renders for this session
    ///
    /// the tracked set is discarded. already rendered output is left alone;
    /// clearing it is the sink's job.
    pub fn stop(&self) {
        let mut gate = self.inner.gate.write();
        if *gate == SchedulerState::Stopped {
            return;
        }
        *gate = SchedulerState::Stopped;
        *self.inner.tracked.write() = Arc::new(TrackedSet::default());
        self.inner.stop_tx.send_replace(true);
        tracing::info!(session = self.inner.number, "monitoring stopped");
    }

    /// resolves once the session is stopped
    pub async fn stopped(&self) {
        let mut stop_rx = self.inner.stop_tx.subscribe();
        // the sender lives as long as the session, so this only ends on stop
        let _ = stop_rx.wait_for(|stopped| *stopped).await;
    }

    /// cycle every `cadence` until the session stops
    ///
    /// the first cycle runs one cadence from now, since start() already ran
    /// one. cycles never overlap; a slow cycle delays the next tick.
    pub async fn run_every(&self, cadence: Duration) {
        if cadence.is_zero() {
            tracing::error!(session = self.inner.number, "refusing to poll with a zero cadence");
            return;
        }

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + cadence, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stopped() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        tracing::debug!(
                            session = self.inner.number,
                            error = %e,
                            "periodic polling ended"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// run_every on a background task
    pub fn spawn_every(&self, cadence: Duration) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run_every(cadence).await })
    }
}

impl Session {
    /// fetch one device and render it, None when the session stopped first
    async fn poll_device(&self, device: &DeviceId) -> Option<PollOutcome> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return None;
        }

        let bound = self.fetch_timeout + FETCH_GRACE;
        let outcome = tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => return None,
            fetched = tokio::time::timeout(bound, self.source.fetch(device)) => match fetched {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(
                        device = %device,
                        kind = %FailureKind::Timeout,
                        bound_ms = bound.as_millis() as u64,
                        "source exceeded fetch bound"
                    );
                    PollOutcome::failed(FailureKind::Timeout, device)
                }
            },
        };

        self.render(device, &outcome).then_some(outcome)
    }

    /// hand the outcome to the sink unless stopped; true if rendered
    fn render(&self, device: &DeviceId, outcome: &PollOutcome) -> bool {
        let gate = self.gate.read();
        if *gate == SchedulerState::Stopped {
            return false;
        }
        self.sink.render(device, outcome);
        true
    }
}
