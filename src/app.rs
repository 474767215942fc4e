use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use flightcrawl_core::AppConfig;
use flightcrawl_dispatcher::CrawlDispatcher;
use flightcrawl_domain::{JobOptions, MessageQueue, RequestCreate, RequestRepository};
use flightcrawl_infrastructure::{MessageQueueFactory, RepositoryFactory};
use flightcrawl_worker::{CrawlExecutor, CrawlWorker, HttpFetchExecutor, NoopExecutor};

/// Application run mode
#[derive(Debug, Clone)]
pub enum AppMode {
    /// Persist, stage, and enqueue one search request
    Submit(RequestCreate),
    /// Consume the task queue and crawl
    Worker,
}

/// Main application: wires the request store and message queue from
/// configuration and runs the selected mode.
pub struct Application {
    config: AppConfig,
    repository: Arc<dyn RequestRepository>,
    queue: Arc<dyn MessageQueue>,
}

impl Application {
    pub async fn new(mut config: AppConfig) -> Result<Self> {
        let database_url = config.effective_database_url();
        let broker_url = config.effective_broker_url();
        config.database.url = database_url;
        config.message_queue.url = broker_url;

        let repository = RepositoryFactory::connect(&config.database)
            .await
            .context("failed to connect the request store")?;
        let queue = MessageQueueFactory::create(&config.message_queue)
            .context("failed to create the message queue")?;

        Ok(Self {
            config,
            repository,
            queue,
        })
    }

    pub async fn run(&self, mode: AppMode, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        match mode {
            AppMode::Submit(create) => self.run_submit(create).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
        }
    }

    async fn run_submit(&self, create: RequestCreate) -> Result<()> {
        let dispatcher = CrawlDispatcher::new(
            Arc::clone(&self.queue),
            self.config.message_queue.task_queue.clone(),
        );

        let job = dispatcher
            .submit(
                Arc::clone(&self.repository),
                &self.config.crawler.data_root,
                create,
                JobOptions::default(),
            )
            .await
            .context("failed to submit request")?;

        info!(
            request_id = job.request().id,
            "request staged at {}", job.save_path().display()
        );

        // the id is what clients poll status by
        println!("{}", job.request().id);

        Ok(())
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let executor: Arc<dyn CrawlExecutor> = match &self.config.crawler.base_url {
            Some(base_url) => Arc::new(HttpFetchExecutor::new(
                base_url.clone(),
                Duration::from_secs(self.config.crawler.request_timeout_seconds),
            )?),
            None => {
                warn!("no crawler.base_url configured, running with the no-op executor");
                Arc::new(NoopExecutor)
            }
        };

        let worker = CrawlWorker::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.queue),
            executor,
            &self.config.crawler.data_root,
            self.config.message_queue.task_queue.clone(),
        )
        .with_worker_id(self.config.worker.worker_id.clone())
        .with_reset_staging(self.config.worker.reset_staging);

        worker
            .run(shutdown_rx)
            .await
            .context("worker consume loop failed")?;

        Ok(())
    }
}
