use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use flightcrawl_core::{CrawlerError, Result};

/// The crawl operation itself, injected into the worker. Implementations
/// receive the request's canonical search path and its staging directory
/// and either run to completion or error; they are never cancelled
/// mid-flight.
#[async_trait]
pub trait CrawlExecutor: Send + Sync {
    async fn crawl(&self, search_path: &str, staging: &Path) -> Result<()>;
}

/// Fetches the search page and stores the raw body under `completed/`.
/// Parsing the result pages happens downstream, not here.
pub struct HttpFetchExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetchExecutor {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlerError::Crawl(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CrawlExecutor for HttpFetchExecutor {
    async fn crawl(&self, search_path: &str, staging: &Path) -> Result<()> {
        let url = format!("{}/{search_path}", self.base_url);
        info!("fetching {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CrawlerError::Crawl(format!("request to {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| CrawlerError::Crawl(format!("{url} returned an error status: {e}")))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| CrawlerError::Crawl(format!("failed to read body from {url}: {e}")))?;

        let target = staging.join("completed").join("results.html");
        tokio::fs::write(&target, &body).await?;

        info!("stored {} bytes at {}", body.len(), target.display());

        Ok(())
    }
}

/// Executor that does nothing; used for drills and when no base url is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

#[async_trait]
impl CrawlExecutor for NoopExecutor {
    async fn crawl(&self, search_path: &str, _staging: &Path) -> Result<()> {
        info!("noop crawl for {search_path}");
        Ok(())
    }
}
