use thiserror::Error;

/// Crawl pipeline error types
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no request found for id {id}, ensure the job was created first")]
    RequestNotFound { id: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("message queue error: {0}")]
    MessageQueue(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("crawl failed: {0}")]
    Crawl(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlerError {
    /// Connection-level broker faults are the only errors the consume loop
    /// retries; everything else propagates to the caller.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, CrawlerError::Connection(_))
    }
}

/// Unified Result type
pub type Result<T> = std::result::Result<T, CrawlerError>;
