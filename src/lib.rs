pub mod capacity;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geofence;
pub mod headway;
pub mod output;
pub mod parser;
pub mod probes;
pub mod scheduler;
pub mod stats;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
