//! current value and signed change between the two latest readings

use crate::domain::{DisplayMetric, ReadingHistory};

/// derive the display value of `metric` from a fetched history
///
/// the delta needs numeric values in both the latest and the previous reading;
/// every other case yields "N/A" rather than an error.
pub fn compute(history: &ReadingHistory, metric: &str) -> DisplayMetric {
    let Some(current) = history.current() else {
        return DisplayMetric::unavailable();
    };

    let delta = match (current.value(metric), history.previous().and_then(|p| p.value(metric))) {
        (Some(now), Some(before)) => Some(now - before),
        _ => None,
    };

    DisplayMetric { current: current.raw(metric).cloned(), delta }
}

/// two decimals with an explicit sign, `+0.00` for no change
pub fn format_signed(delta: f64) -> String {
    format!("{delta:+.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn labels(raw: serde_json::Value, metric: &str) -> (String, String) {
        let metric = compute(&parse(&raw).unwrap(), metric);
        (metric.current_label(), metric.delta_label())
    }

    #[test]
    fn empty_history_is_unavailable() {
        for metric in ["ph", "soil"] {
            assert_eq!(labels(json!([]), metric), ("N/A".into(), "N/A".into()));
        }
    }

    #[test]
    fn single_reading_has_no_delta() {
        assert_eq!(labels(json!([{"ph": 6.5}]), "ph"), ("6.5".into(), "N/A".into()));
    }

    #[test]
    fn signed_delta_between_last_two() {
        assert_eq!(labels(json!([{"ph": 6.0}, {"ph": 6.5}]), "ph"), ("6.5".into(), "+0.50".into()));
        assert_eq!(labels(json!([{"ph": 6.5}, {"ph": 6.0}]), "ph"), ("6.0".into(), "-0.50".into()));
        assert_eq!(
            labels(json!([{"soil": 40}, {"soil": 40}]), "soil"),
            ("40".into(), "+0.00".into())
        );
    }

    #[test]
    fn only_the_last_two_readings_count() {
        let raw = json!([{"ph": 1.0}, {"ph": 7.25}, {"ph": 7.0}]);
        assert_eq!(labels(raw, "ph").1, "-0.25");
    }

    #[test]
    fn non_numeric_neighbour_gives_no_delta() {
        assert_eq!(labels(json!([{"ph": "bad"}, {"ph": 6.5}]), "ph"), ("6.5".into(), "N/A".into()));
        assert_eq!(labels(json!([{"ph": 6.0}, {"ph": null}]), "ph"), ("N/A".into(), "N/A".into()));
        assert_eq!(labels(json!([{"soil": 40}, {"soil": 41}]), "ph"), ("N/A".into(), "N/A".into()));
    }

    #[test]
    fn numeric_strings_do_not_count_for_the_delta() {
        assert_eq!(labels(json!([{"ph": "6.0"}, {"ph": 6.5}]), "ph"), ("6.5".into(), "N/A".into()));
        assert_eq!(labels(json!([{"ph": 6.0}, {"ph": "6.5"}]), "ph"), ("N/A".into(), "N/A".into()));
    }

    #[test]
    fn metrics_are_independent() {
        let raw = json!([{"ph": 6.0, "soil": "x"}, {"ph": 6.2, "soil": 30}]);
        assert_eq!(labels(raw.clone(), "ph").1, "+0.20");
        assert_eq!(labels(raw, "soil"), ("30".into(), "N/A".into()));
    }

    #[test]
    fn formats_with_sign() {
        assert_eq!(format_signed(0.0), "+0.00");
        assert_eq!(format_signed(1.005_1), "+1.01");
        assert_eq!(format_signed(-12.3), "-12.30");
    }
}
