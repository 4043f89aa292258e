//! Per-segment bike and dock capacity sums.

use crate::geofence::SegmentMembership;

/// Station identity and coordinates, fetched once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub station_id: String,
    pub lat: f64,
    pub lon: f64,
}

/// Occupancy counts for one station, refreshed every poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationStatus {
    pub station_id: String,
    pub bikes_available: i64,
    pub docks_available: i64,
}

impl StationStatus {
    pub fn capacity(&self) -> i64 {
        self.bikes_available + self.docks_available
    }
}

/// Bike and capacity totals for one segment in one poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentCapacity {
    pub segment: String,
    pub bikes: i64,
    pub capacity: i64,
}

/// Sums the poll's station statuses per segment.
///
/// Statuses for stations missing from the membership (new stations, or ones
/// outside every geofence) are ignored.
pub fn aggregate(
    statuses: &[StationStatus],
    membership: &SegmentMembership,
) -> Vec<SegmentCapacity> {
    membership
        .iter()
        .map(|members| {
            let mut total = SegmentCapacity {
                segment: members.segment.clone(),
                ..Default::default()
            };
            for status in statuses.iter().filter(|s| members.stations.contains(&s.station_id)) {
                total.bikes += status.bikes_available;
                total.capacity += status.capacity();
            }
            total
        })
        .collect()
}

/// Zero totals for every segment, used when a poll fails.
pub fn empty(membership: &SegmentMembership) -> Vec<SegmentCapacity> {
    aggregate(&[], membership)
}
