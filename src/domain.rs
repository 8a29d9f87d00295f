//! ==============================================================================
//! domain.rs - telemetry data model
//! ==============================================================================
//!
//! purpose:
//!     the types that flow from the fetcher to the render sinks.
//!
//! relationships:
//!     - produced by: parser.rs (Reading, ReadingHistory)
//!     - produced by: delta.rs (DisplayMetric), series.rs (TimeSeries)
//!     - produced by: fetcher.rs (PollOutcome)
//!     - owned by: scheduler.rs (TrackedSet)
//!     - consumed by: sink.rs, server.rs
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::FailureKind;

/// label shown wherever a value cannot be computed
pub const NOT_AVAILABLE: &str = "N/A";

/// opaque identifier of one physical pot, supplied by the identity service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ==============================================================================
// readings
// ==============================================================================

/// one sample for a device
///
/// json numbers are kept in `values`. strings that read as a finite number
/// (`"6.0"`, `" 7 "`) go to `coerced`, which only the chart looks at.
/// anything else is simply absent here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reading {
    values: BTreeMap<String, Number>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    coerced: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl Reading {
    pub fn new(values: BTreeMap<String, Number>, timestamp: Option<String>) -> Self {
        Self { values, coerced: BTreeMap::new(), timestamp }
    }

    pub fn with_coerced(mut self, coerced: BTreeMap<String, f64>) -> Self {
        self.coerced = coerced;
        self
    }

    /// numeric value of `metric`, or None when absent or sent as a string
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).and_then(Number::as_f64)
    }

    /// `value()`, falling back to a numeric string
    pub fn chart_value(&self, metric: &str) -> Option<f64> {
        self.value(metric).or_else(|| self.coerced.get(metric).copied())
    }

    /// the number exactly as the service sent it (keeps `7` vs `7.0`)
    pub fn raw(&self, metric: &str) -> Option<&Number> {
        self.values.get(metric)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}

/// ordered (oldest first) readings returned by a single fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReadingHistory(Vec<Reading>);

impl ReadingHistory {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self(readings)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn readings(&self) -> &[Reading] {
        &self.0
    }

    pub fn current(&self) -> Option<&Reading> {
        self.0.last()
    }

    pub fn previous(&self) -> Option<&Reading> {
        self.0.len().checked_sub(2).map(|i| &self.0[i])
    }
}

// ==============================================================================
// derived display values
// ==============================================================================

/// current value and signed change for one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMetric {
    pub current: Option<Number>,
    pub delta: Option<f64>,
}

impl DisplayMetric {
    pub fn unavailable() -> Self {
        Self { current: None, delta: None }
    }

    /// "6.5" or "N/A"
    pub fn current_label(&self) -> String {
        match &self.current {
            Some(n) => n.to_string(),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    /// "+0.50", "-0.50" or "N/A"
    pub fn delta_label(&self) -> String {
        match self.delta {
            Some(d) => crate::delta::format_signed(d),
            None => NOT_AVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// position of the reading in the fetched history
    pub index: usize,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// chartable points for one metric, rows without a numeric value dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

// ==============================================================================
// per-device outcome
// ==============================================================================

/// everything a sink needs to draw one healthy device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub readings: usize,
    pub metrics: BTreeMap<String, DisplayMetric>,
    pub series: BTreeMap<String, TimeSeries>,
}

/// result of polling one device during one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Ok(DeviceSnapshot),
    /// reachable, well-formed, zero readings
    Empty,
    Failed { kind: FailureKind, message: String },
}

impl PollOutcome {
    /// failure with the short message shown to users; details go to the log
    pub fn failed(kind: FailureKind, device: &DeviceId) -> Self {
        Self::Failed { kind, message: kind.user_message(device) }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&DeviceSnapshot> {
        match self {
            Self::Ok(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// outcomes of one complete cycle, swapped in as a whole
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackedSet {
    /// 0 until the first cycle completes
    pub cycle: u64,
    /// unix timestamp (ms) when the cycle finished
    pub completed_at_ms: u64,
    pub outcomes: BTreeMap<DeviceId, PollOutcome>,
}

impl TrackedSet {
    pub fn get(&self, device: &DeviceId) -> Option<&PollOutcome> {
        self.outcomes.get(device)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// unix timestamp in milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
