//! ==============================================================================
//! parser.rs - reading history parser
//! ==============================================================================
//!
//! purpose:
//!     turns the raw json returned by the telemetry endpoint into a typed,
//!     ordered ReadingHistory.
//!
//! payload shape (oldest first):
//!
//! ```text
//!     [
//!       {"ph": 6.4, "soil": 41, "timestamp": "2024-05-01T10:00:00Z"},
//!       {"ph": 6.5, "soil": "err"},
//!       {"soil": 40}
//!     ]
//! ```
//!
//! field model:
//!     - the top level must be an array, every element an object
//!     - numeric fields become values
//!     - strings holding a finite number are kept aside for charting only
//!     - anything else (null, booleans, nested objects) is treated as absent
//!     - missing keys are absent, never an error
//!
//! ==============================================================================

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::domain::{Reading, ReadingHistory};
use crate::error::{json_type, ParseError};

/// keys accepted as a reading's timestamp, first match wins
const TIMESTAMP_KEYS: [&str; 2] = ["timestamp", "created_at"];

/// parse a raw response body
pub fn parse_body(body: &[u8]) -> Result<ReadingHistory, ParseError> {
    let raw: Value = serde_json::from_slice(body)?;
    parse(&raw)
}

/// parse an already decoded json document
pub fn parse(raw: &Value) -> Result<ReadingHistory, ParseError> {
    let elements = raw.as_array().ok_or_else(|| ParseError::NotAnArray(json_type(raw)))?;

    let readings = elements
        .iter()
        .enumerate()
        .map(|(index, element)| match element {
            Value::Object(fields) => Ok(parse_reading(fields)),
            other => Err(ParseError::NotAnObject { index, found: json_type(other) }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReadingHistory::new(readings))
}

fn parse_reading(fields: &Map<String, Value>) -> Reading {
    let values: BTreeMap<_, _> = fields
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Number(n) if n.as_f64().is_some_and(f64::is_finite) => {
                Some((key.clone(), n.clone()))
            }
            _ => None,
        })
        .collect();

    let coerced: BTreeMap<_, _> = fields
        .iter()
        .filter(|(key, _)| !TIMESTAMP_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| match value {
            Value::String(s) => coerce(s).map(|v| (key.clone(), v)),
            _ => None,
        })
        .collect();

    let timestamp = TIMESTAMP_KEYS
        .iter()
        .find_map(|key| match fields.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

    Reading::new(values, timestamp).with_coerced(coerced)
}

fn coerce(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_readings_in_order() {
        let history = parse(&json!([{"ph": 6.0, "soil": 40}, {"ph": 6.5, "soil": 42}])).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.readings()[0].value("ph"), Some(6.0));
        assert_eq!(history.current().unwrap().value("soil"), Some(42.0));
    }

    #[test]
    fn missing_and_non_numeric_fields_are_absent() {
        let history = parse(&json!([
            {"soil": 40},
            {"ph": "bad", "soil": null},
            {"ph": true, "soil": {"nested": 1}},
            {"ph": "6.5"}
        ]))
        .unwrap();

        assert_eq!(history.len(), 4);
        for reading in history.readings() {
            assert_eq!(reading.value("ph"), None);
        }
        assert_eq!(history.readings()[0].value("soil"), Some(40.0));
        assert_eq!(history.readings()[1].value("soil"), None);
    }

    #[test]
    fn numeric_strings_only_reach_the_chart() {
        let raw = json!([{"ph": " 6.0 ", "soil": "NaN", "timestamp": "12"}, {"ph": "inf"}]);
        let history = parse(&raw).unwrap();
        let first = &history.readings()[0];
        assert_eq!(first.value("ph"), None);
        assert_eq!(first.chart_value("ph"), Some(6.0));
        assert_eq!(first.chart_value("soil"), None);
        assert_eq!(first.chart_value("timestamp"), None);
        assert_eq!(history.readings()[1].chart_value("ph"), None);
    }

    #[test]
    fn keeps_number_as_sent() {
        let history = parse(&json!([{"soil": 7, "ph": 6.0}])).unwrap();
        let current = history.current().unwrap();
        assert_eq!(current.raw("soil").unwrap().to_string(), "7");
        assert_eq!(current.raw("ph").unwrap().to_string(), "6.0");
    }

    #[test]
    fn accepts_optional_timestamp() {
        let history = parse(&json!([
            {"ph": 6.0, "timestamp": "2024-05-01T10:00:00Z"},
            {"ph": 6.1, "created_at": 1714557600000u64},
            {"ph": 6.2}
        ]))
        .unwrap();
        let stamps: Vec<_> = history.readings().iter().map(|r| r.timestamp()).collect();
        assert_eq!(stamps, vec![Some("2024-05-01T10:00:00Z"), Some("1714557600000"), None]);
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_array() {
        let err = parse(&json!({"ph": 6.5})).unwrap_err();
        assert!(matches!(err, ParseError::NotAnArray("object")));
        assert_eq!(err.kind(), crate::error::FailureKind::MalformedResponse);

        assert!(matches!(parse(&json!(null)), Err(ParseError::NotAnArray("null"))));
    }

    #[test]
    fn rejects_non_object_element() {
        let err = parse(&json!([{"ph": 6.5}, 7])).unwrap_err();
        assert!(matches!(err, ParseError::NotAnObject { index: 1, found: "number" }));
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(matches!(parse_body(b"<html>502</html>"), Err(ParseError::NotJson(_))));
        assert_eq!(parse_body(br#"[{"ph": 5}]"#).unwrap().len(), 1);
    }
}
