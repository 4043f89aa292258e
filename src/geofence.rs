//! Geofence assignment of bike-share stations to named line segments.
//!
//! A station belongs to a segment when it lies within the geofence radius of
//! any of that segment's reference points. Membership is computed once after
//! the station-information fetch and never changes during a run. Stations
//! outside every geofence belong to no segment and contribute nothing.
//!
//! Segments are tested independently, so a station inside two segments'
//! geofences is counted by both.

use serde::Deserialize;
use std::collections::HashSet;

use crate::capacity::StationInfo;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A named anchor for a segment, usually a rapid-transit station.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReferencePoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl ReferencePoint {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
        }
    }
}

/// A logical portion of a transit line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Segment {
    /// Short identifier used in CSV column names, e.g. `south`.
    pub name: String,
    /// Human-readable description for console output.
    #[serde(default)]
    pub label: String,
    pub reference_points: Vec<ReferencePoint>,
}

impl Segment {
    /// True if `(lat, lon)` is within `radius_meters` of any reference point.
    pub fn covers(&self, lat: f64, lon: f64, radius_meters: f64) -> bool {
        self.reference_points
            .iter()
            .any(|p| haversine_distance(lat, lon, p.lat, p.lon) <= radius_meters)
    }
}

/// Great-circle distance in meters between two WGS84 coordinates.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Member station IDs of a single segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentMembers {
    pub segment: String,
    pub stations: HashSet<String>,
}

/// Segment → member station IDs, in segment configuration order.
#[derive(Debug, Clone, Default)]
pub struct SegmentMembership {
    entries: Vec<SegmentMembers>,
}

impl SegmentMembership {
    pub fn iter(&self) -> impl Iterator<Item = &SegmentMembers> {
        self.entries.iter()
    }

    pub fn members(&self, segment: &str) -> Option<&HashSet<String>> {
        self.entries
            .iter()
            .find(|m| m.segment == segment)
            .map(|m| &m.stations)
    }

    /// Number of distinct stations assigned to at least one segment.
    pub fn mapped_stations(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|m| m.stations.iter())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Computes segment membership for every station against every segment.
pub fn assign(
    stations: &[StationInfo],
    segments: &[Segment],
    radius_meters: f64,
) -> SegmentMembership {
    let entries = segments
        .iter()
        .map(|segment| SegmentMembers {
            segment: segment.name.clone(),
            stations: stations
                .iter()
                .filter(|s| segment.covers(s.lat, s.lon, radius_meters))
                .map(|s| s.station_id.clone())
                .collect(),
        })
        .collect();

    SegmentMembership { entries }
}
