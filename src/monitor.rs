//! start/stop control over a monitoring session and its periodic driver
//!
//! this is what the dashboard's "Start Monitoring" / "Stop Monitoring" toggle
//! drives. the device list is fixed at login; a different list means a new
//! Monitor.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::domain::{DeviceId, TrackedSet};
use crate::error::SchedulerError;
use crate::scheduler::{PollScheduler, SchedulerState, SessionHandle};

struct Running {
    session: SessionHandle,
    driver: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Monitor {
    scheduler: Arc<PollScheduler>,
    devices: Arc<[DeviceId]>,
    cadence: Duration,
    running: Arc<Mutex<Option<Running>>>,
}

impl Monitor {
    pub fn new(scheduler: Arc<PollScheduler>, devices: Vec<DeviceId>, cadence: Duration) -> Self {
        Self {
            scheduler,
            devices: devices.into(),
            cadence,
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SchedulerState::Active
    }

    /// start a session and its periodic driver; no-op when already running
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.session.is_stopped()) {
            return Ok(());
        }

        let session = self.scheduler.start(self.devices.iter().cloned()).await?;
        let driver = session.spawn_every(self.cadence);
        *running = Some(Running { session, driver });
        Ok(())
    }

    /// stop the session and wait for its driver to finish
    pub async fn stop(&self) {
        let Some(Running { session, driver }) = self.running.lock().await.take() else {
            return;
        };
        session.stop();
        if let Err(e) = driver.await {
            tracing::error!(error = %e, "polling driver ended abnormally");
        }
    }

    /// one-shot cycle on the running session ("refresh now")
    pub async fn refresh(&self) -> Result<Arc<TrackedSet>, SchedulerError> {
        let session = self.running.lock().await.as_ref().map(|r| r.session.clone());
        match session {
            Some(session) => session.cycle().await,
            None => Err(SchedulerError::Stopped),
        }
    }

    /// outcomes of the last completed cycle, empty after stop()
    pub fn tracked(&self) -> Option<Arc<TrackedSet>> {
        self.scheduler.session().map(|s| s.tracked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PollOutcome;
    use crate::fetcher::TelemetrySource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl TelemetrySource for CountingSource {
        async fn fetch(&self, _device: &DeviceId) -> PollOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            PollOutcome::Empty
        }
    }

    fn monitor(source: Arc<CountingSource>, devices: Vec<DeviceId>) -> Monitor {
        let sink = Arc::new(|_: &DeviceId, _: &PollOutcome| {});
        let scheduler = Arc::new(PollScheduler::new(source, sink, Duration::from_secs(1)));
        Monitor::new(scheduler, devices, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn start_stop_toggle() {
        let source = Arc::new(CountingSource::default());
        let monitor = monitor(source.clone(), vec!["a".into(), "b".into()]);
        assert_eq!(monitor.state(), SchedulerState::Idle);

        monitor.start().await.unwrap();
        monitor.start().await.unwrap();
        assert!(monitor.is_active());
        assert_eq!(source.0.load(Ordering::SeqCst), 2);

        let tracked = monitor.refresh().await.unwrap();
        assert_eq!(tracked.cycle, 2);

        monitor.stop().await;
        assert_eq!(monitor.state(), SchedulerState::Stopped);
        assert!(matches!(monitor.refresh().await, Err(SchedulerError::Stopped)));
        assert!(monitor.tracked().unwrap().is_empty());

        monitor.start().await.unwrap();
        assert!(monitor.is_active());
        assert_eq!(monitor.tracked().unwrap().cycle, 1);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn no_devices_cannot_start() {
        let monitor = monitor(Arc::new(CountingSource::default()), Vec::new());
        assert!(matches!(monitor.start().await, Err(SchedulerError::InvalidConfiguration(_))));
        assert_eq!(monitor.state(), SchedulerState::Idle);
    }
}
