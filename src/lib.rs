//! potwatch - live plant-pot telemetry
//!
//! polls a telemetry service for every pot a user owns, derives the current
//! value, signed delta and a chart series per metric, and hands each pot's
//! outcome to render sinks without letting one pot's failure touch another.
//!
//! leaves first:
//!
//! ```text
//!     parser -> delta, series -> fetcher -> scheduler -> sink
//! ```
//!
//! identity, monitor and server are the glue around that core.

pub mod config;
pub mod delta;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod identity;
pub mod monitor;
pub mod parser;
pub mod scheduler;
pub mod series;
pub mod server;
pub mod sink;

pub use domain::{
    DeviceId, DisplayMetric, PollOutcome, Reading, ReadingHistory, TimeSeries, TrackedSet,
};
pub use error::{FailureKind, SchedulerError};
pub use fetcher::{HttpFetcher, TelemetrySource};
pub use scheduler::{PollScheduler, SchedulerState, SessionHandle};
pub use sink::RenderSink;
