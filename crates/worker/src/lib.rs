mod executors;
mod service;

pub use executors::{CrawlExecutor, HttpFetchExecutor, NoopExecutor};
pub use service::CrawlWorker;
