pub mod database;
pub mod in_memory_queue;
pub mod queue_factory;
pub mod rabbitmq;

pub use database::{PostgresRequestRepository, RepositoryFactory, SqliteRequestRepository};
pub use in_memory_queue::InMemoryQueue;
pub use queue_factory::MessageQueueFactory;
pub use rabbitmq::RabbitMqQueue;
