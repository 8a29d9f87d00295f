//! per-metric chart series built from a reading history

use std::collections::BTreeMap;

use crate::domain::{ReadingHistory, SeriesPoint, TimeSeries};

/// one series per requested metric
///
/// values are coerced the way a chart would (`"6.0"` plots as 6.0). a reading
/// without a usable value for a metric is dropped from that metric's series
/// only, so series lengths may differ. order is kept, nothing is interpolated.
pub fn build<S: AsRef<str>>(
    history: &ReadingHistory,
    metrics: &[S],
) -> BTreeMap<String, TimeSeries> {
    metrics
        .iter()
        .map(|metric| {
            let metric = metric.as_ref();
            (metric.to_string(), series_for(history, metric))
        })
        .collect()
}

fn series_for(history: &ReadingHistory, metric: &str) -> TimeSeries {
    let points = history
        .readings()
        .iter()
        .enumerate()
        .filter_map(|(index, reading)| {
            reading.chart_value(metric).map(|value| SeriesPoint {
                index,
                value,
                timestamp: reading.timestamp().map(str::to_string),
            })
        })
        .collect();

    TimeSeries { points }
}
