use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use flightcrawl_core::Result;
use flightcrawl_domain::{
    CrawlMessage, JobContext, JobOptions, MessageHandler, MessageQueue, RequestRepository,
};

use crate::executors::CrawlExecutor;

/// Queue-consuming crawl worker. One blocking consume loop per process;
/// fleet concurrency comes from running more processes against the same
/// durable queue.
pub struct CrawlWorker {
    worker_id: String,
    repository: Arc<dyn RequestRepository>,
    queue: Arc<dyn MessageQueue>,
    executor: Arc<dyn CrawlExecutor>,
    data_root: PathBuf,
    queue_name: String,
    reset_staging: bool,
}

impl CrawlWorker {
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        queue: Arc<dyn MessageQueue>,
        executor: Arc<dyn CrawlExecutor>,
        data_root: &Path,
        queue_name: String,
    ) -> Self {
        Self {
            worker_id: derive_worker_id(),
            repository,
            queue,
            executor,
            data_root: data_root.to_path_buf(),
            queue_name,
            reset_staging: false,
        }
    }

    pub fn with_worker_id(mut self, worker_id: String) -> Self {
        if !worker_id.is_empty() {
            self.worker_id = worker_id;
        }
        self
    }

    /// Wipe a request's staging directory before re-processing it.
    pub fn with_reset_staging(mut self, reset: bool) -> Self {
        self.reset_staging = reset;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Block consuming the task queue until the shutdown signal fires.
    pub async fn run(&self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            worker_id = %self.worker_id,
            "worker consuming queue {}", self.queue_name
        );

        let handler = Arc::new(CrawlHandler {
            worker_id: self.worker_id.clone(),
            repository: Arc::clone(&self.repository),
            executor: Arc::clone(&self.executor),
            data_root: self.data_root.clone(),
            reset_staging: self.reset_staging,
        });

        self.queue
            .consume(&self.queue_name, handler, shutdown)
            .await
    }
}

fn derive_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "worker".to_string());

    format!("{host}-{}", &Uuid::new_v4().to_string()[..8])
}

/// Per-delivery callback. Crawl failures are terminal business outcomes:
/// they mark the request failed and never escape this boundary, so the
/// queue layer acks the message instead of redelivering it.
///
/// Exclusive ownership of the staging directory rests on the broker's
/// single-delivery semantics alone; a redelivery after a crash before the
/// ack can hand the same request id to two workers at once.
struct CrawlHandler {
    worker_id: String,
    repository: Arc<dyn RequestRepository>,
    executor: Arc<dyn CrawlExecutor>,
    data_root: PathBuf,
    reset_staging: bool,
}

#[async_trait]
impl MessageHandler for CrawlHandler {
    async fn handle(&self, message: CrawlMessage) -> Result<()> {
        let mut job = JobContext::attach(
            Arc::clone(&self.repository),
            &self.data_root,
            message.request_id,
            JobOptions {
                reset: self.reset_staging,
                save_path: None,
            },
        )
        .await
        .map_err(|e| {
            error!(
                request_id = message.request_id,
                "cannot reconstruct job from message: {e}"
            );
            e
        })?;

        info!(
            worker_id = %self.worker_id,
            request_id = job.request().id,
            "starting crawl"
        );

        let search_path = job.search_path().to_string();
        let staging = job.save_path().to_path_buf();

        match self.executor.crawl(&search_path, &staging).await {
            Ok(()) => {
                job.success().await?;
                counter!("flightcrawl_crawls_finished_total").increment(1);
            }
            Err(e) => {
                error!(request_id = job.request().id, "crawl failed: {e}");
                job.fail().await?;
                counter!("flightcrawl_crawls_failed_total").increment(1);
            }
        }

        Ok(())
    }
}
