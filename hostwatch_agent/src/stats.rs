//! Read-side aggregation over a time window of one series.

use serde::Serialize;
use tracing::warn;

use crate::history::{HistoryStore, Persistence};
use crate::types::{MetricSample, Series};

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// min/max/avg/count over `samples`, or `None` when there is nothing to aggregate.
///
/// With a `subtype` only samples tagged with it are used, unless none are, in
/// which case the whole set is used instead of reporting no data.
pub fn summarize(samples: &[MetricSample], subtype: Option<&str>) -> Option<SeriesStats> {
    let filtered: Vec<&MetricSample> = match subtype {
        Some(want) => samples.iter().filter(|s| s.subtype() == Some(want)).collect(),
        None => Vec::new(),
    };
    let values: Vec<f64> = if filtered.is_empty() {
        samples.iter().map(|s| s.value).collect()
    } else {
        filtered.iter().map(|s| s.value).collect()
    };
    if values.is_empty() {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for v in &values {
        min = min.min(*v);
        max = max.max(*v);
        sum += v;
    }
    // rounding happens once, after the full-precision sum
    let avg = sum / values.len() as f64;
    Some(SeriesStats {
        min: round1(min),
        max: round1(max),
        avg: round1(avg),
        count: values.len(),
    })
}

/// Stats for the last `window_hours` before `now`. Storage failures read as "no data".
pub async fn stats_at<P: Persistence>(
    store: &HistoryStore<P>,
    series: Series,
    window_hours: u32,
    subtype: Option<&str>,
    now: i64,
) -> Option<SeriesStats> {
    let cutoff = now.saturating_sub(i64::from(window_hours) * HOUR_MS);
    match store.query(series, cutoff).await {
        Ok(samples) => summarize(&samples, subtype),
        Err(e) => {
            warn!(%series, error = %e, "stats query failed");
            None
        }
    }
}

pub async fn stats<P: Persistence>(
    store: &HistoryStore<P>,
    series: Series,
    window_hours: u32,
    subtype: Option<&str>,
) -> Option<SeriesStats> {
    stats_at(store, series, window_hours, subtype, crate::types::now_ms()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_uses_unrounded_sum() {
        let samples: Vec<MetricSample> = [0.04, 0.04, 0.04, 0.04, 0.04, 0.24]
            .iter()
            .enumerate()
            .map(|(i, v)| MetricSample::new(i as i64, *v))
            .collect();
        let s = summarize(&samples, None).unwrap();
        // averaging pre-rounded values would give 0.0
        assert_eq!(s.avg, 0.1);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 0.2);
        assert_eq!(s.count, 6);
    }

    #[test]
    fn empty_input_is_no_data() {
        assert_eq!(summarize(&[], None), None);
        assert_eq!(summarize(&[], Some("cpu")), None);
    }
}
