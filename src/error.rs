//! failure taxonomy shared by the fetcher, the scheduler and the sinks

use serde::Serialize;
use std::fmt;

use crate::domain::DeviceId;

/// why a device could not be displayed this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    /// non-timeout transport or http status failure
    NetworkError,
    /// body is not json, not an array, or holds non-object elements
    MalformedResponse,
    /// unexpected failure after a structurally valid response
    ProcessingError,
    /// empty device set handed to the scheduler
    InvalidConfiguration,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::MalformedResponse => "malformed_response",
            Self::ProcessingError => "processing_error",
            Self::InvalidConfiguration => "invalid_configuration",
        }
    }

    /// short message safe to show in the dashboard
    pub fn user_message(self, device: &DeviceId) -> String {
        match self {
            Self::Timeout => format!("Timeout fetching data for Pot {device}."),
            Self::NetworkError => format!("Error fetching data for Pot {device}."),
            Self::MalformedResponse => format!("Invalid data received for Pot {device}."),
            Self::ProcessingError => format!("Error processing data for Pot {device}."),
            Self::InvalidConfiguration => format!("Pot {device} is not configured correctly."),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// a history payload that cannot be turned into readings
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("body is not valid json: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("expected a json array of readings, got {0}")]
    NotAnArray(&'static str),
    #[error("reading #{index} is not an object (got {found})")]
    NotAnObject { index: usize, found: &'static str },
}

impl ParseError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::MalformedResponse
    }
}

/// errors returned by the scheduler itself (device failures never end up here)
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("monitoring session has been stopped")]
    Stopped,
}

impl SchedulerError {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::InvalidConfiguration(_) => Some(FailureKind::InvalidConfiguration),
            Self::Stopped => None,
        }
    }
}

/// name of a json value's type, for error messages
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
