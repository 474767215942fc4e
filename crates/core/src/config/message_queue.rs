use serde::{Deserialize, Serialize};

/// Message queue backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    #[default]
    Rabbitmq,
    InMemory,
}

/// Message queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueConfig {
    #[serde(rename = "type")]
    pub r#type: MessageQueueType,
    pub url: String,
    pub task_queue: String,
    /// Max unacknowledged deliveries held by one consumer.
    pub prefetch_count: u16,
    pub reconnect_delay_seconds: u64,
    pub connection_timeout_seconds: u64,
}

impl MessageQueueConfig {
    /// Validate message queue configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_queue.is_empty() {
            return Err(anyhow::anyhow!("task queue name must not be empty"));
        }

        if self.prefetch_count == 0 {
            return Err(anyhow::anyhow!("prefetch_count must be greater than 0"));
        }

        if self.reconnect_delay_seconds == 0 {
            return Err(anyhow::anyhow!(
                "reconnect_delay_seconds must be greater than 0"
            ));
        }

        if self.r#type == MessageQueueType::Rabbitmq {
            if self.url.is_empty() {
                return Err(anyhow::anyhow!("rabbitmq requires a broker url"));
            }
            if !self.url.starts_with("amqp://") && !self.url.starts_with("amqps://") {
                return Err(anyhow::anyhow!(
                    "broker url must start with amqp:// or amqps://"
                ));
            }
        }

        Ok(())
    }

    /// Managed brokers are addressed with amqps:// and negotiate TLS.
    pub fn requires_tls(&self) -> bool {
        self.url.starts_with("amqps://")
    }
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            r#type: MessageQueueType::default(),
            url: "amqp://localhost:5672/%2f".to_string(),
            task_queue: "crawl_requests".to_string(),
            prefetch_count: 1,
            reconnect_delay_seconds: 5,
            connection_timeout_seconds: 30,
        }
    }
}
