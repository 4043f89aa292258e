//! Feed decoders.
//!
//! GBFS JSON and GTFS-realtime protobuf payloads are decoded into the
//! engine's fixed record shapes. Missing or odd-typed numeric fields become 0
//! and missing strings become empty, per station; only payloads that are not
//! valid JSON or protobuf at all are errors.

use prost::Message;
use serde_json::Value;

use crate::capacity::{StationInfo, StationStatus};
use crate::error::TelemetryError;
use crate::gtfs_rt::FeedMessage;
use crate::headway::ArrivalEvent;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, TelemetryError> {
    FeedMessage::decode(bytes).map_err(|e| TelemetryError::decode("trip_updates", e))
}

/// Flattens every trip update's stop-time updates into arrival events.
///
/// Updates without a stop id, without an arrival, or whose arrival carries
/// only a delay are skipped.
pub fn extract_arrivals(feed: &FeedMessage) -> Vec<ArrivalEvent> {
    feed.entity
        .iter()
        .filter_map(|e| e.trip_update.as_ref())
        .flat_map(|tu| tu.stop_time_update.iter())
        .filter_map(|stu| {
            let stop_id = stu.stop_id.as_ref()?;
            let time = stu.arrival.as_ref()?.time?;
            Some(ArrivalEvent {
                stop_id: stop_id.clone(),
                arrival_time: time,
            })
        })
        .collect()
}

/// The `data.stations` array of a GBFS document; absent means no stations.
fn stations(feed: &'static str, bytes: &[u8]) -> Result<Vec<Value>, TelemetryError> {
    let mut root: Value =
        serde_json::from_slice(bytes).map_err(|e| TelemetryError::decode(feed, e))?;
    match root.pointer_mut("/data/stations").map(Value::take) {
        Some(Value::Array(stations)) => Ok(stations),
        _ => Ok(Vec::new()),
    }
}

// Field readers are lenient per value: a field that is missing, null or of
// an unexpected type reads as 0 / "" without affecting other stations.

fn text_field(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn float_field(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn int_field(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Decodes a GBFS `station_information.json` document.
pub fn parse_station_information(bytes: &[u8]) -> Result<Vec<StationInfo>, TelemetryError> {
    Ok(stations("station_information", bytes)?
        .iter()
        .map(|s| StationInfo {
            station_id: text_field(&s["station_id"]),
            lat: float_field(&s["lat"]),
            lon: float_field(&s["lon"]),
        })
        .collect())
}

/// Decodes a GBFS `station_status.json` document.
pub fn parse_station_status(bytes: &[u8]) -> Result<Vec<StationStatus>, TelemetryError> {
    Ok(stations("station_status", bytes)?
        .iter()
        .map(|s| StationStatus {
            station_id: text_field(&s["station_id"]),
            bikes_available: int_field(&s["num_bikes_available"]),
            docks_available: int_field(&s["num_docks_available"]),
        })
        .collect())
}
