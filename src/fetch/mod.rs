//! Raw feed retrieval.
//!
//! [`FeedSource`] is what the probes poll: a URL goes in, bytes or a
//! [`TelemetryError::Fetch`] come out. [`HttpFeedSource`] serves `http(s)`
//! URLs through an [`HttpClient`] and reads anything else from disk, which
//! allows replaying captured feeds.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::error::TelemetryError;

/// Fetches a feed body by URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, TelemetryError>;
}

/// Issues a GET for `url`, rejecting non-2xx responses.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, TelemetryError> {
    let parsed = url
        .parse::<reqwest::Url>()
        .map_err(|e| TelemetryError::fetch(url, e))?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await.map_err(|e| describe(url, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TelemetryError::fetch(url, format!("HTTP {status}")));
    }

    resp.bytes().await.map_err(|e| describe(url, e))
}

fn describe(url: &str, e: reqwest::Error) -> TelemetryError {
    if e.is_timeout() {
        TelemetryError::fetch(url, "timed out")
    } else {
        TelemetryError::fetch(url, e)
    }
}

/// [`FeedSource`] over HTTP with local-file fallback.
pub struct HttpFeedSource<C = BasicClient> {
    client: C,
}

impl HttpFeedSource<BasicClient> {
    pub fn new(timeout: Duration) -> Result<Self, TelemetryError> {
        let client = BasicClient::with_timeout(timeout)
            .map_err(|e| TelemetryError::Setup(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl<C: HttpClient> HttpFeedSource<C> {
    pub fn with_client(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for HttpFeedSource<C> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Bytes, TelemetryError> {
        let bytes = if url.starts_with("http") {
            fetch_bytes(&self.client, url).await?
        } else {
            tokio::fs::read(url)
                .await
                .map(Bytes::from)
                .map_err(|e| TelemetryError::fetch(url, e))?
        };
        debug!(bytes = bytes.len(), "Feed bytes received");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl HttpClient for Unreachable {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            unreachable!("local paths must not hit the network")
        }
    }

    /// Answers every request with a fixed status and body.
    struct Canned(u16, &'static str);

    #[async_trait]
    impl HttpClient for Canned {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let resp = http::Response::builder()
                .status(self.0)
                .body(self.1)
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let err = fetch_bytes(&Canned(503, "unavailable"), "https://feed.example/status.json")
            .await
            .unwrap_err();

        match &err {
            TelemetryError::Fetch { url, reason } => {
                assert_eq!(url, "https://feed.example/status.json");
                assert!(reason.starts_with("HTTP 503"));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_success_status_returns_body() {
        let source = HttpFeedSource::with_client(Canned(200, "{\"data\":{}}"));
        let bytes = source.fetch("https://feed.example/status.json").await.unwrap();
        assert_eq!(&bytes[..], b"{\"data\":{}}");
    }

    #[tokio::test]
    async fn test_local_file_is_read_from_disk() {
        let path = std::env::temp_dir().join("segment_telemetry_fetch_local.json");
        std::fs::write(&path, b"{\"data\":{}}").unwrap();

        let source = HttpFeedSource::with_client(Unreachable);
        let bytes = source.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(&bytes[..], b"{\"data\":{}}");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_local_file_is_fetch_error() {
        let source = HttpFeedSource::with_client(Unreachable);
        let err = source
            .fetch("/nonexistent/segment_telemetry/feed.pb")
            .await
            .unwrap_err();

        assert!(matches!(err, TelemetryError::Fetch { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_url_is_fetch_error() {
        let source = HttpFeedSource::with_client(Unreachable);
        let err = source.fetch("http://").await.unwrap_err();
        assert!(matches!(err, TelemetryError::Fetch { .. }));
    }
}
