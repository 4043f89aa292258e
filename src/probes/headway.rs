use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

use crate::config::{BoundaryStop, HeadwayConfig};
use crate::error::TelemetryError;
use crate::fetch::FeedSource;
use crate::headway::{self, HeadwayAnalysis, HeadwayHistory};
use crate::parser::{extract_arrivals, parse_feed};
use crate::scheduler::{Probe, TelemetryRow, Tick};

/// Renders intervals as `[4, 6, 5]`.
pub fn format_intervals(intervals: &[i64]) -> String {
    let items: Vec<String> = intervals.iter().map(i64::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Headways at one boundary stop for one tick.
#[derive(Debug, Clone)]
pub struct StopHeadway {
    pub boundary: BoundaryStop,
    pub analysis: HeadwayAnalysis,
}

#[derive(Debug, Clone)]
pub struct HeadwayRow {
    pub tick: Tick,
    pub latency_ms: Option<u64>,
    pub stops: Vec<StopHeadway>,
}

impl TelemetryRow for HeadwayRow {
    fn record(&self) -> Vec<String> {
        let mut record = vec![self.tick.timestamp_text(), self.tick.iteration.to_string()];
        for stop in &self.stops {
            record.push(stop.analysis.arrival_count().to_string());
            record.push(format_intervals(&stop.analysis.intervals));
            record.push(format!("{:.2}", stop.analysis.stddev));
        }
        record
    }

    fn report(&self) {
        info!(
            iteration = self.tick.iteration,
            timestamp = %self.tick.timestamp_text(),
            latency_ms = self.latency_ms,
            "Headway sample"
        );
        for stop in &self.stops {
            info!(
                segment = %stop.boundary.label,
                arrivals = stop.analysis.arrival_count(),
                headways = %format_intervals(&stop.analysis.intervals),
                std = %format!("{:.2}", stop.analysis.stddev),
                "  boundary stop headways"
            );
        }
    }
}

/// Samples GTFS-realtime trip updates and keeps the run's headway history.
pub struct HeadwayProbe<F> {
    source: F,
    trip_updates_url: String,
    boundaries: Vec<BoundaryStop>,
    history: HeadwayHistory,
}

impl<F: FeedSource> HeadwayProbe<F> {
    pub fn new(source: F, config: &HeadwayConfig) -> Self {
        Self {
            source,
            trip_updates_url: config.trip_updates_url.clone(),
            boundaries: config.boundaries.clone(),
            history: HeadwayHistory::new(config.boundaries.iter().map(|b| b.name.as_str())),
        }
    }

    pub fn history(&self) -> &HeadwayHistory {
        &self.history
    }
}

#[async_trait]
impl<F: FeedSource> Probe for HeadwayProbe<F> {
    type Row = HeadwayRow;

    fn name(&self) -> &'static str {
        "headway"
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec!["timestamp".to_string(), "iteration".to_string()];
        for b in &self.boundaries {
            header.push(format!("{}_arrivals", b.name));
            header.push(format!("{}_headways", b.name));
            header.push(format!("{}_stddev", b.name));
        }
        header
    }

    async fn setup(&mut self) -> Result<(), TelemetryError> {
        for b in &self.boundaries {
            info!(boundary = %b.name, stop_id = %b.stop_id, label = %b.label, "Tracking boundary stop");
        }
        Ok(())
    }

    async fn sample(&mut self, tick: &Tick) -> Result<HeadwayRow, TelemetryError> {
        let started = Instant::now();
        let bytes = self.source.fetch(&self.trip_updates_url).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let arrivals = extract_arrivals(&parse_feed(&bytes)?);

        let stops: Vec<StopHeadway> = self
            .boundaries
            .iter()
            .map(|b| StopHeadway {
                boundary: b.clone(),
                analysis: headway::analyze(&arrivals, &b.stop_id),
            })
            .collect();
        for stop in &stops {
            self.history
                .record(&stop.boundary.name, &stop.analysis.intervals);
        }

        Ok(HeadwayRow {
            tick: tick.clone(),
            latency_ms: Some(latency_ms),
            stops,
        })
    }

    fn empty(&self, tick: &Tick) -> HeadwayRow {
        HeadwayRow {
            tick: tick.clone(),
            latency_ms: None,
            stops: self
                .boundaries
                .iter()
                .map(|b| StopHeadway {
                    boundary: b.clone(),
                    analysis: HeadwayAnalysis::default(),
                })
                .collect(),
        }
    }

    fn finish(&self) {
        info!("Final segment headway summary");
        for (boundary, summary) in self.boundaries.iter().zip(self.history.summary()) {
            if summary.samples == 0 {
                info!(segment = %boundary.label, "NO DATA");
                continue;
            }
            info!(
                segment = %boundary.label,
                samples = summary.samples,
                avg_min = %format!("{:.2}", summary.mean),
                std = %format!("{:.2}", summary.stddev),
                "FINAL"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
    use crate::gtfs_rt::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};
    use bytes::Bytes;
    use prost::Message;
    use std::sync::Mutex;

    /// Serves queued responses in order.
    struct QueuedSource(Mutex<Vec<Result<Vec<u8>, TelemetryError>>>);

    #[async_trait]
    impl FeedSource for QueuedSource {
        async fn fetch(&self, url: &str) -> Result<Bytes, TelemetryError> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                return Err(TelemetryError::fetch(url, "exhausted"));
            }
            queue.remove(0).map(Bytes::from)
        }
    }

    fn feed(arrivals: &[(&str, i64)]) -> Vec<u8> {
        let entity = arrivals
            .iter()
            .enumerate()
            .map(|(i, &(stop, time))| FeedEntity {
                id: i.to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor::default(),
                    stop_time_update: vec![StopTimeUpdate {
                        stop_id: Some(stop.to_string()),
                        arrival: Some(StopTimeEvent {
                            time: Some(time),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity,
        }
        .encode_to_vec()
    }

    fn probe(responses: Vec<Result<Vec<u8>, TelemetryError>>) -> HeadwayProbe<QueuedSource> {
        HeadwayProbe::new(QueuedSource(Mutex::new(responses)), &HeadwayConfig::default())
    }

    #[test]
    fn test_format_intervals() {
        assert_eq!(format_intervals(&[]), "[]");
        assert_eq!(format_intervals(&[4, 6, 5]), "[4, 6, 5]");
    }

    #[test]
    fn test_header_has_three_columns_per_boundary() {
        let probe = probe(vec![]);
        assert_eq!(
            probe.header(),
            vec![
                "timestamp",
                "iteration",
                "sullivan_arrivals",
                "sullivan_headways",
                "sullivan_stddev",
                "ruggles_arrivals",
                "ruggles_headways",
                "ruggles_stddev"
            ]
        );
    }

    #[tokio::test]
    async fn test_sample_measures_each_boundary() {
        let body = feed(&[
            ("70030", 220),
            ("70030", 100),
            ("70030", 160),
            ("70010", 1000),
            ("70020", 1060),
        ]);
        let mut probe = probe(vec![Ok(body)]);

        let row = probe.sample(&Tick::new(1)).await.unwrap();
        let record = row.record();
        assert_eq!(&record[1..], &["1", "3", "[1, 1]", "0.00", "1", "[]", "0.00"]);
        assert_eq!(probe.history().intervals("sullivan"), &[1, 1]);
        assert!(probe.history().intervals("ruggles").is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_history_untouched() {
        let mut probe = probe(vec![
            Ok(feed(&[("70010", 0), ("70010", 300)])),
            Err(TelemetryError::fetch("tu", "timed out")),
            Ok(vec![0xFF, 0xFE, 0x00, 0x01]),
            Ok(feed(&[("70010", 0), ("70010", 420)])),
        ]);

        assert!(probe.sample(&Tick::new(1)).await.is_ok());
        assert!(probe.sample(&Tick::new(2)).await.is_err());
        assert!(matches!(
            probe.sample(&Tick::new(3)).await,
            Err(TelemetryError::Decode { .. })
        ));
        assert!(probe.sample(&Tick::new(4)).await.is_ok());

        assert_eq!(probe.history().intervals("ruggles"), &[5, 7]);
        let summary = probe.history().summary();
        assert_eq!(summary[1].mean, 6.0);
        assert_eq!(summary[1].stddev, 1.0);
    }

    #[test]
    fn test_empty_row_is_zero_valued() {
        let probe = probe(vec![]);
        let record = probe.empty(&Tick::new(5)).record();
        assert_eq!(&record[1..], &["5", "0", "[]", "0.00", "0", "[]", "0.00"]);
    }
}
