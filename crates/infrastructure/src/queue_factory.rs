use std::sync::Arc;

use tracing::info;

use flightcrawl_core::config::{MessageQueueConfig, MessageQueueType};
use flightcrawl_core::{CrawlerError, Result};
use flightcrawl_domain::MessageQueue;

use crate::{InMemoryQueue, RabbitMqQueue};

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    pub fn create(config: &MessageQueueConfig) -> Result<Arc<dyn MessageQueue>> {
        match config.r#type {
            MessageQueueType::Rabbitmq => {
                if config.url.is_empty() {
                    return Err(CrawlerError::Configuration(
                        "rabbitmq queue requires a broker url".to_string(),
                    ));
                }
                info!("initializing RabbitMQ message queue");
                Ok(Arc::new(RabbitMqQueue::new(config.clone())))
            }
            MessageQueueType::InMemory => {
                info!("initializing in-memory message queue");
                Ok(Arc::new(InMemoryQueue::new()))
            }
        }
    }
}
