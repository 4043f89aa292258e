//! Feed-specific tick bodies driven by the [`Scheduler`](crate::scheduler::Scheduler).
//!
//! [`CapacityProbe`] samples bike-share station status and sums it per
//! geofenced segment. [`HeadwayProbe`] samples GTFS-realtime trip updates
//! and measures headways at each segment's boundary stop.

mod capacity;
mod headway;

pub use capacity::{CapacityProbe, CapacityRow};
pub use headway::{HeadwayProbe, HeadwayRow, StopHeadway, format_intervals};
