//! Failure taxonomy for the telemetry engine.
//!
//! Setup and sink failures end the run. Fetch and decode failures are local
//! to the tick that hit them: the scheduler logs them and records a
//! zero-valued row instead.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to decode {feed} payload: {reason}")]
    Decode { feed: &'static str, reason: String },
    #[error("failed to append to {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl TelemetryError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        TelemetryError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(feed: &'static str, reason: impl ToString) -> Self {
        TelemetryError::Decode {
            feed,
            reason: reason.to_string(),
        }
    }

    /// Whether the run must stop instead of recording an empty tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TelemetryError::Setup(_) | TelemetryError::Sink { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_follows_taxonomy() {
        assert!(TelemetryError::Setup("no stations".into()).is_fatal());
        assert!(!TelemetryError::fetch("http://x", "timed out").is_fatal());
        assert!(!TelemetryError::decode("station_status", "bad json").is_fatal());

        let sink = TelemetryError::Sink {
            path: PathBuf::from("out.csv"),
            source: csv::Error::from(std::io::Error::other("disk full")),
        };
        assert!(sink.is_fatal());
    }

    #[test]
    fn test_fetch_message_names_url() {
        let e = TelemetryError::fetch("https://feed.example/status.json", "HTTP 503");
        assert_eq!(
            e.to_string(),
            "fetch failed for https://feed.example/status.json: HTTP 503"
        );
    }
}
