use async_trait::async_trait;
use tracing::info;

use crate::capacity::{self, SegmentCapacity};
use crate::config::CapacityConfig;
use crate::error::TelemetryError;
use crate::fetch::FeedSource;
use crate::geofence::{self, Segment, SegmentMembership};
use crate::parser::{parse_station_information, parse_station_status};
use crate::scheduler::{Probe, TelemetryRow, Tick};

/// Per-segment bike availability and capacity for one tick.
#[derive(Debug, Clone)]
pub struct CapacityRow {
    pub tick: Tick,
    pub labels: Vec<String>,
    pub totals: Vec<SegmentCapacity>,
}

impl TelemetryRow for CapacityRow {
    fn record(&self) -> Vec<String> {
        let mut record = vec![self.tick.timestamp_text(), self.tick.iteration.to_string()];
        for total in &self.totals {
            record.push(total.bikes.to_string());
            record.push(total.capacity.to_string());
        }
        record
    }

    fn report(&self) {
        info!(
            iteration = self.tick.iteration,
            timestamp = %self.tick.timestamp_text(),
            "Capacity sample"
        );
        for (label, total) in self.labels.iter().zip(&self.totals) {
            info!(
                segment = %total.segment,
                label = %label,
                bikes = total.bikes,
                capacity = total.capacity,
                "  available bikes / total capacity"
            );
        }
    }
}

/// Samples GBFS station status against segment membership computed at setup.
pub struct CapacityProbe<F> {
    source: F,
    station_information_url: String,
    station_status_url: String,
    radius_meters: f64,
    segments: Vec<Segment>,
    membership: SegmentMembership,
}

impl<F: FeedSource> CapacityProbe<F> {
    pub fn new(source: F, config: &CapacityConfig) -> Self {
        Self {
            source,
            station_information_url: config.station_information_url.clone(),
            station_status_url: config.station_status_url.clone(),
            radius_meters: config.radius_meters,
            segments: config.segments.clone(),
            membership: SegmentMembership::default(),
        }
    }

    fn labels(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.label.clone()).collect()
    }
}

#[async_trait]
impl<F: FeedSource> Probe for CapacityProbe<F> {
    type Row = CapacityRow;

    fn name(&self) -> &'static str {
        "capacity"
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec!["timestamp".to_string(), "iteration".to_string()];
        for segment in &self.segments {
            header.push(format!("{}_bikes", segment.name));
            header.push(format!("{}_capacity", segment.name));
        }
        header
    }

    #[tracing::instrument(skip(self), fields(url = %self.station_information_url))]
    async fn setup(&mut self) -> Result<(), TelemetryError> {
        let setup_err = |e: TelemetryError| TelemetryError::Setup(e.to_string());

        let bytes = self
            .source
            .fetch(&self.station_information_url)
            .await
            .map_err(setup_err)?;
        let stations = parse_station_information(&bytes).map_err(setup_err)?;
        if stations.is_empty() {
            return Err(TelemetryError::Setup(
                "station information contained no stations".to_string(),
            ));
        }

        self.membership = geofence::assign(&stations, &self.segments, self.radius_meters);

        for members in self.membership.iter() {
            let mut ids: Vec<&str> = members.stations.iter().map(String::as_str).collect();
            ids.sort_unstable();
            info!(segment = %members.segment, count = ids.len(), stations = ?ids, "Segment station IDs");
        }
        info!(
            stations = stations.len(),
            mapped = self.membership.mapped_stations(),
            "Station membership computed"
        );
        Ok(())
    }

    async fn sample(&mut self, tick: &Tick) -> Result<CapacityRow, TelemetryError> {
        let bytes = self.source.fetch(&self.station_status_url).await?;
        let statuses = parse_station_status(&bytes)?;

        Ok(CapacityRow {
            tick: tick.clone(),
            labels: self.labels(),
            totals: capacity::aggregate(&statuses, &self.membership),
        })
    }

    fn empty(&self, tick: &Tick) -> CapacityRow {
        CapacityRow {
            tick: tick.clone(),
            labels: self.labels(),
            totals: capacity::empty(&self.membership),
        }
    }

    fn finish(&self) {
        info!("Finished bike capacity collection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    struct StaticSource(HashMap<String, Result<Vec<u8>, String>>);

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch(&self, url: &str) -> Result<Bytes, TelemetryError> {
            match self.0.get(url) {
                Some(Ok(body)) => Ok(Bytes::from(body.clone())),
                Some(Err(reason)) => Err(TelemetryError::fetch(url, reason)),
                None => Err(TelemetryError::fetch(url, "HTTP 404 Not Found")),
            }
        }
    }

    fn config() -> CapacityConfig {
        CapacityConfig {
            station_information_url: "info".to_string(),
            station_status_url: "status".to_string(),
            ..Default::default()
        }
    }

    const INFO: &str = r#"{"data":{"stations":[
        {"station_id":"ruggles-1","lat":42.3364,"lon":-71.0892},
        {"station_id":"sullivan-1","lat":42.3841,"lon":-71.0771},
        {"station_id":"downtown","lat":42.3555,"lon":-71.0605}
    ]}}"#;

    const STATUS: &str = r#"{"data":{"stations":[
        {"station_id":"ruggles-1","num_bikes_available":5,"num_docks_available":3},
        {"station_id":"sullivan-1","num_bikes_available":2,"num_docks_available":13},
        {"station_id":"downtown","num_bikes_available":40,"num_docks_available":1}
    ]}}"#;

    fn source(status: Result<&str, &str>) -> StaticSource {
        let mut bodies = HashMap::new();
        bodies.insert("info".to_string(), Ok(INFO.as_bytes().to_vec()));
        bodies.insert(
            "status".to_string(),
            status.map(|s| s.as_bytes().to_vec()).map_err(str::to_string),
        );
        StaticSource(bodies)
    }

    #[test]
    fn test_header_has_two_columns_per_segment() {
        let probe = CapacityProbe::new(source(Ok(STATUS)), &config());
        assert_eq!(
            probe.header(),
            vec![
                "timestamp",
                "iteration",
                "south_bikes",
                "south_capacity",
                "north_bikes",
                "north_capacity"
            ]
        );
    }

    #[tokio::test]
    async fn test_sample_sums_member_stations() {
        let mut probe = CapacityProbe::new(source(Ok(STATUS)), &config());
        probe.setup().await.unwrap();

        let row = probe.sample(&Tick::new(1)).await.unwrap();
        let record = row.record();
        assert_eq!(&record[1..], &["1", "5", "8", "2", "15"]);
    }

    #[tokio::test]
    async fn test_empty_row_is_zero_for_every_segment() {
        let mut probe = CapacityProbe::new(source(Err("timed out")), &config());
        probe.setup().await.unwrap();

        let tick = Tick::new(2);
        assert!(probe.sample(&tick).await.is_err());
        let record = probe.empty(&tick).record();
        assert_eq!(&record[1..], &["2", "0", "0", "0", "0"]);
    }

    #[tokio::test]
    async fn test_setup_without_stations_is_fatal() {
        let mut bodies = HashMap::new();
        bodies.insert("info".to_string(), Ok(br#"{"data":{"stations":[]}}"#.to_vec()));
        let mut probe = CapacityProbe::new(StaticSource(bodies), &config());

        let err = probe.setup().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Setup(_)));
    }

    #[tokio::test]
    async fn test_setup_fetch_failure_is_fatal() {
        let mut probe = CapacityProbe::new(StaticSource(HashMap::new()), &config());
        let err = probe.setup().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
