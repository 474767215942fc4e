use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, Span};

use flightcrawl_core::{CrawlerError, Result};

use crate::entities::{id_from_dir, Request, RequestCreate, RequestStatus};
use crate::repositories::RequestRepository;

/// Construction options for a [`JobContext`].
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Remove an existing staging subtree before re-creating it.
    pub reset: bool,
    /// Pin the staging directory instead of deriving it from the request.
    pub save_path: Option<PathBuf>,
}

/// Orchestration handle bound to one persisted request.
///
/// One context exists per handling attempt (producer enqueue or worker
/// dequeue) and is discarded afterwards; contexts are never shared across
/// tasks. The store stays the source of truth for status: every
/// transition is written through before the local snapshot changes.
pub struct JobContext {
    request: Request,
    save_path: PathBuf,
    search_path: String,
    repository: Arc<dyn RequestRepository>,
    span: Span,
}

impl JobContext {
    pub const COMPLETED_DIR: &'static str = "completed";
    pub const FAILED_DIR: &'static str = "failed";
    pub const REQUEST_FILE: &'static str = "request.json";

    /// Validate and persist new search parameters, then stage the job.
    /// Creation is idempotent: resubmitting identical parameters resolves
    /// to the already-persisted request.
    pub async fn create(
        repository: Arc<dyn RequestRepository>,
        data_root: &Path,
        create: RequestCreate,
        options: JobOptions,
    ) -> Result<Self> {
        create.validate()?;
        let request = repository.create_or_get(&create).await?;
        Self::build(repository, data_root, request, options).await
    }

    /// Bind to an already-persisted request, re-fetching the current row so
    /// the snapshot reflects the latest status. A missing row is fatal, not
    /// retried, since it means the create step never ran.
    pub async fn attach(
        repository: Arc<dyn RequestRepository>,
        data_root: &Path,
        request_id: i64,
        options: JobOptions,
    ) -> Result<Self> {
        let request = Self::pull(&repository, request_id).await?;
        Self::build(repository, data_root, request, options).await
    }

    /// Recover a context from a staging directory alone by parsing the
    /// trailing `id<N>` token; the context stays pinned to that directory.
    pub async fn from_dir(repository: Arc<dyn RequestRepository>, directory: &Path) -> Result<Self> {
        let request_id = id_from_dir(directory)?;
        let request = Self::pull(&repository, request_id).await?;

        Self::build(
            repository,
            directory,
            request,
            JobOptions {
                reset: false,
                save_path: Some(directory.to_path_buf()),
            },
        )
        .await
    }

    async fn build(
        repository: Arc<dyn RequestRepository>,
        data_root: &Path,
        request: Request,
        options: JobOptions,
    ) -> Result<Self> {
        let save_path = options
            .save_path
            .unwrap_or_else(|| request.save_path(data_root));

        if options.reset && tokio::fs::try_exists(&save_path).await? {
            tokio::fs::remove_dir_all(&save_path).await?;
        }

        let context = Self {
            search_path: request.search_path(),
            span: request.span(),
            request,
            save_path,
            repository,
        };

        context.setup_path().await?;

        Ok(context)
    }

    async fn pull(repository: &Arc<dyn RequestRepository>, id: i64) -> Result<Request> {
        repository
            .get_by_id(id)
            .await?
            .ok_or(CrawlerError::RequestNotFound { id })
    }

    /// Ensure the staging skeleton exists and the request snapshot is on
    /// disk. Idempotent; an existing snapshot is left untouched.
    pub async fn setup_path(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.save_path).await?;
        tokio::fs::create_dir_all(self.save_path.join(Self::COMPLETED_DIR)).await?;
        tokio::fs::create_dir_all(self.save_path.join(Self::FAILED_DIR)).await?;

        let request_file = self.save_path.join(Self::REQUEST_FILE);
        if !tokio::fs::try_exists(&request_file).await? {
            let snapshot = serde_json::to_vec_pretty(&self.request)
                .map_err(|e| CrawlerError::Serialization(e.to_string()))?;
            tokio::fs::write(&request_file, snapshot).await?;
        }

        Ok(())
    }

    /// Current status as the store sees it, not the local snapshot.
    pub async fn get_status(&self) -> Result<Option<RequestStatus>> {
        Ok(Self::pull(&self.repository, self.request.id).await?.status)
    }

    /// Write the status through to the store, then update the snapshot.
    pub async fn update_status(&mut self, status: RequestStatus) -> Result<()> {
        self.repository
            .update_status(self.request.id, status)
            .await?;
        self.request.status = Some(status);

        let _entered = self.span.enter();
        info!("status updated: {status}");

        Ok(())
    }

    pub async fn fail(&mut self) -> Result<()> {
        self.update_status(RequestStatus::Failed).await
    }

    pub async fn success(&mut self) -> Result<()> {
        self.update_status(RequestStatus::Finished).await
    }

    /// Recursively delete the staging directory if present.
    pub async fn remove_path(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.save_path).await? {
            tokio::fs::remove_dir_all(&self.save_path).await?;
        }
        Ok(())
    }

    /// Read the on-disk request snapshot back.
    pub async fn snapshot_from_file(&self) -> Result<Request> {
        let raw = tokio::fs::read(self.save_path.join(Self::REQUEST_FILE)).await?;
        serde_json::from_slice(&raw).map_err(|e| CrawlerError::Serialization(e.to_string()))
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn search_path(&self) -> &str {
        &self.search_path
    }
}
