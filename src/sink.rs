//! ==============================================================================
//! sink.rs - render sink contract
//! ==============================================================================
//!
//! purpose:
//!     the scheduler hands every (device, outcome) pair to a RenderSink as
//!     soon as that device is done. what "rendering" means is up to the sink:
//!     the web dashboard (server.rs) keeps a panel per pot, LogSink writes to
//!     the log.
//!
//! contract:
//!     - called once per device per cycle, from the device's own task
//!     - no ordering across devices
//!     - must not fail and must return quickly (it runs under the render gate)
//!     - must not call stop() on the session it renders for: the render
//!       gate is held for reading and stop() waits for it. reading state()
//!       is fine
//!     - the outcome is a shared snapshot; clone it to keep it
//!
//! ==============================================================================

use std::sync::Arc;

use crate::domain::{DeviceId, PollOutcome};

pub trait RenderSink: Send + Sync {
    fn render(&self, device: &DeviceId, outcome: &PollOutcome);
}

/// plain closures work as sinks
impl<F> RenderSink for F
where
    F: Fn(&DeviceId, &PollOutcome) + Send + Sync,
{
    fn render(&self, device: &DeviceId, outcome: &PollOutcome) {
        self(device, outcome)
    }
}

/// forwards every outcome to several sinks, in order
#[derive(Clone, Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn RenderSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn RenderSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RenderSink for CompositeSink {
    fn render(&self, device: &DeviceId, outcome: &PollOutcome) {
        for sink in &self.sinks {
            sink.render(device, outcome);
        }
    }
}

/// writes outcomes to the tracing log
pub struct LogSink {
    show_readings: bool,
}

impl LogSink {
    pub fn new(show_readings: bool) -> Self {
        Self { show_readings }
    }
}

impl RenderSink for LogSink {
    fn render(&self, device: &DeviceId, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Ok(snapshot) => {
                if !self.show_readings {
                    return;
                }
                let summary = snapshot
                    .metrics
                    .iter()
                    .map(|(name, metric)| {
                        format!("{name}={} ({})", metric.current_label(), metric.delta_label())
                    })
                    .collect::<Vec<_>>()
                    .join(" | ");
                tracing::info!(device = %device, readings = snapshot.readings, "{summary}");
            }
            PollOutcome::Empty => tracing::info!(device = %device, "no data"),
            // the fetcher already logged the detail
            PollOutcome::Failed { kind, message } => {
                tracing::debug!(device = %device, %kind, "{message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn composite_forwards_to_every_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let seen = seen.clone();
            move |device: &DeviceId, _: &PollOutcome| seen.lock().push(format!("first:{device}"))
        };
        let second = {
            let seen = seen.clone();
            move |device: &DeviceId, _: &PollOutcome| seen.lock().push(format!("second:{device}"))
        };

        let sink = CompositeSink::new().with(Arc::new(first)).with(Arc::new(second));
        assert_eq!(sink.len(), 2);
        sink.render(&DeviceId::from("pot-1"), &PollOutcome::Empty);

        assert_eq!(*seen.lock(), vec!["first:pot-1", "second:pot-1"]);
    }

    #[test]
    fn log_sink_accepts_every_outcome() {
        let sink = LogSink::new(true);
        let device = DeviceId::from("pot-1");
        sink.render(&device, &PollOutcome::Empty);
        sink.render(&device, &PollOutcome::failed(crate::error::FailureKind::Timeout, &device));
    }
}
