//! Run configuration.
//!
//! Defaults describe the reference deployment: Bluebikes stations along the
//! MBTA Orange Line, and Orange Line trip updates at Sullivan Square and
//! Ruggles. A JSON file may override any subset of keys.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geofence::{ReferencePoint, Segment};
use crate::scheduler::Schedule;

/// Allowed per-request fetch timeout, in seconds.
pub const FETCH_TIMEOUT_SECS: std::ops::RangeInclusive<u64> = 5..=8;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ticks: u32,
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub capacity: CapacityConfig,
    pub headway: HeadwayConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub station_information_url: String,
    pub station_status_url: String,
    pub radius_meters: f64,
    pub segments: Vec<Segment>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeadwayConfig {
    pub trip_updates_url: String,
    pub boundaries: Vec<BoundaryStop>,
    pub output: PathBuf,
}

/// The stop at which a segment's headway is measured.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoundaryStop {
    /// Column prefix, e.g. `sullivan`.
    pub name: String,
    pub stop_id: String,
    #[serde(default)]
    pub label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticks: 240,
            interval_secs: 60,
            fetch_timeout_secs: 8,
            capacity: CapacityConfig::default(),
            headway: HeadwayConfig::default(),
        }
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        let p = ReferencePoint::new;
        Self {
            station_information_url: "https://gbfs.lyft.com/gbfs/1.1/bos/en/station_information.json"
                .to_string(),
            station_status_url: "https://gbfs.lyft.com/gbfs/1.1/bos/en/station_status.json"
                .to_string(),
            radius_meters: 500.0,
            segments: vec![
                Segment {
                    name: "south".to_string(),
                    label: "South (Forest Hills → Ruggles)".to_string(),
                    reference_points: vec![
                        p("Forest Hills", 42.2988, -71.1131),
                        p("Green Street", 42.3106, -71.1074),
                        p("Stony Brook", 42.3173, -71.1041),
                        p("Jackson Square", 42.3233, -71.0996),
                        p("Roxbury Crossing", 42.3313, -71.0956),
                        p("Ruggles", 42.3364, -71.0892),
                    ],
                },
                Segment {
                    name: "north".to_string(),
                    label: "North (Malden → Sullivan)".to_string(),
                    reference_points: vec![
                        p("Malden Center", 42.4267, -71.0744),
                        p("Wellington", 42.4024, -71.0771),
                        p("Assembly", 42.3927, -71.0772),
                        p("Sullivan", 42.3840, -71.0770),
                    ],
                },
            ],
            output: PathBuf::from("bluebikes_orange_capacity.csv"),
        }
    }
}

impl Default for HeadwayConfig {
    fn default() -> Self {
        Self {
            trip_updates_url: "https://cdn.mbta.com/realtime/TripUpdates.pb".to_string(),
            boundaries: vec![
                BoundaryStop {
                    name: "sullivan".to_string(),
                    stop_id: "70030".to_string(),
                    label: "North Segment (Malden to Sullivan)".to_string(),
                },
                BoundaryStop {
                    name: "ruggles".to_string(),
                    stop_id: "70010".to_string(),
                    label: "South Segment (Forest Hills to Ruggles)".to_string(),
                },
            ],
            output: PathBuf::from("orange_segment_headways.csv"),
        }
    }
}

impl Config {
    /// Loads a JSON config file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            ticks: self.ticks,
            interval: Duration::from_secs(self.interval_secs),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ticks == 0 {
            bail!("ticks must be at least 1");
        }
        if !FETCH_TIMEOUT_SECS.contains(&self.fetch_timeout_secs) {
            bail!(
                "fetch_timeout_secs must be between {} and {}, got {}",
                FETCH_TIMEOUT_SECS.start(),
                FETCH_TIMEOUT_SECS.end(),
                self.fetch_timeout_secs
            );
        }
        let radius = self.capacity.radius_meters;
        if radius.is_nan() || radius <= 0.0 {
            bail!("capacity.radius_meters must be positive");
        }
        if self.capacity.segments.is_empty() {
            bail!("capacity.segments must not be empty");
        }
        let mut names = HashSet::new();
        for segment in &self.capacity.segments {
            if segment.reference_points.is_empty() {
                bail!("segment '{}' has no reference points", segment.name);
            }
            if !names.insert(segment.name.as_str()) {
                bail!("duplicate segment name '{}'", segment.name);
            }
        }
        if self.headway.boundaries.is_empty() {
            bail!("headway.boundaries must not be empty");
        }
        let mut names = HashSet::new();
        for boundary in &self.headway.boundaries {
            if !names.insert(boundary.name.as_str()) {
                bail!("duplicate boundary name '{}'", boundary.name);
            }
        }
        Ok(())
    }
}
