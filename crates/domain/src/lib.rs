pub mod entities;
pub mod job;
pub mod messaging;
pub mod repositories;

pub use entities::{Request, RequestCreate, RequestStatus, SortOption};
pub use job::{JobContext, JobOptions};
pub use messaging::{CrawlMessage, MessageHandler, MessageQueue};
pub use repositories::RequestRepository;
