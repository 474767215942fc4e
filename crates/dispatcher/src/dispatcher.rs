use std::path::Path;
use std::sync::Arc;

use metrics::counter;
use tracing::info;

use flightcrawl_core::Result;
use flightcrawl_domain::{
    CrawlMessage, JobContext, JobOptions, MessageQueue, RequestCreate, RequestRepository,
};

/// Producer-side glue: stages a job and hands its request identifier to a
/// worker via the durable queue.
pub struct CrawlDispatcher {
    queue: Arc<dyn MessageQueue>,
    queue_name: String,
}

impl CrawlDispatcher {
    pub fn new(queue: Arc<dyn MessageQueue>, queue_name: String) -> Self {
        Self { queue, queue_name }
    }

    /// Publish the job's persisted identifier, not the full request, so
    /// the worker re-reads the latest row when it picks the job up.
    pub async fn enqueue(&self, job: &JobContext) -> Result<()> {
        let message = CrawlMessage::for_request(job.request().id);
        self.queue.publish(&self.queue_name, &message).await?;

        counter!("flightcrawl_requests_enqueued_total").increment(1);
        info!(
            request_id = job.request().id,
            "queued crawl request on {}", self.queue_name
        );

        Ok(())
    }

    /// Full producer path: validate, persist, stage on disk, enqueue.
    pub async fn submit(
        &self,
        repository: Arc<dyn RequestRepository>,
        data_root: &Path,
        create: RequestCreate,
        options: JobOptions,
    ) -> Result<JobContext> {
        let job = JobContext::create(repository, data_root, create, options).await?;
        self.enqueue(&job).await?;
        Ok(job)
    }
}
