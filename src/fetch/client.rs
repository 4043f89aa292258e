use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a prepared HTTP request; the seam between feed polling and reqwest.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
