//! Headway measurement at segment boundary stops.
//!
//! Each poll yields predicted arrivals; those at a boundary stop are sorted
//! and differenced into headways. Headways are whole minutes, truncated
//! (`seconds / 60`), so a 119 second gap reports as 1. Reported values
//! depend on that truncation and it is kept as is.

use std::collections::HashMap;

use crate::stats::mean_and_stddev;

/// A predicted vehicle arrival at a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalEvent {
    pub stop_id: String,
    pub arrival_time: i64,
}

impl ArrivalEvent {
    pub fn new(stop_id: &str, arrival_time: i64) -> Self {
        Self {
            stop_id: stop_id.to_string(),
            arrival_time,
        }
    }
}

/// Headways observed at one stop within a single poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadwayAnalysis {
    /// Sorted arrival epochs at the stop.
    pub arrivals: Vec<i64>,
    /// Minutes between consecutive arrivals.
    pub intervals: Vec<i64>,
    /// Population standard deviation of `intervals`.
    pub stddev: f64,
}

impl HeadwayAnalysis {
    pub fn arrival_count(&self) -> usize {
        self.arrivals.len()
    }
}

/// Computes headways at `stop_id` from one poll's arrivals.
///
/// Fewer than two matching arrivals give no intervals and a zero stddev.
pub fn analyze(arrivals: &[ArrivalEvent], stop_id: &str) -> HeadwayAnalysis {
    let mut times: Vec<i64> = arrivals
        .iter()
        .filter(|a| a.stop_id == stop_id)
        .map(|a| a.arrival_time)
        .collect();
    times.sort_unstable();

    let intervals: Vec<i64> = times
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]) / 60)
        .collect();
    let (_, stddev) = mean_and_stddev(&intervals);

    HeadwayAnalysis {
        arrivals: times,
        intervals,
        stddev,
    }
}

/// Whole-run headway statistics for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadwaySummary {
    pub segment: String,
    pub samples: usize,
    pub mean: f64,
    pub stddev: f64,
}

/// Every interval observed during a run, per segment.
///
/// Owned by the headway probe and only appended to; the summary is read once
/// the run is done.
#[derive(Debug, Default)]
pub struct HeadwayHistory {
    order: Vec<String>,
    intervals: HashMap<String, Vec<i64>>,
}

impl HeadwayHistory {
    pub fn new<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut history = Self::default();
        for segment in segments {
            history.slot(segment);
        }
        history
    }

    fn slot(&mut self, segment: &str) -> &mut Vec<i64> {
        if !self.intervals.contains_key(segment) {
            self.order.push(segment.to_string());
        }
        self.intervals.entry(segment.to_string()).or_default()
    }

    pub fn record(&mut self, segment: &str, intervals: &[i64]) {
        self.slot(segment).extend_from_slice(intervals);
    }

    pub fn intervals(&self, segment: &str) -> &[i64] {
        self.intervals.get(segment).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn summary(&self) -> Vec<HeadwaySummary> {
        self.order
            .iter()
            .map(|segment| {
                let intervals = self.intervals(segment);
                let (mean, stddev) = mean_and_stddev(intervals);
                HeadwaySummary {
                    segment: segment.clone(),
                    samples: intervals.len(),
                    mean,
                    stddev,
                }
            })
            .collect()
    }
}
