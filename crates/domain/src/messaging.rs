use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use flightcrawl_core::{CrawlerError, Result};

/// Queue payload carrying a persisted request identifier. The broker is the
/// source of truth for delivery state; nothing in-process models it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlMessage {
    pub id: String,
    pub request_id: i64,
    pub enqueued_at: DateTime<Utc>,
}

impl CrawlMessage {
    pub fn for_request(request_id: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id,
            enqueued_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| CrawlerError::Serialization(format!("failed to serialize message: {e}")))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| CrawlerError::Serialization(format!("failed to deserialize message: {e}")))
    }
}

/// Per-delivery callback run by a consume loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: CrawlMessage) -> Result<()>;
}

/// Durable publish/consume over a message broker.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Declare `queue` durable and publish `message` with persistent
    /// delivery. Does not wait for a broker confirm.
    async fn publish(&self, queue: &str, message: &CrawlMessage) -> Result<()>;

    /// Declare `queue` durable and block delivering messages to `handler`
    /// until the shutdown signal fires. Connection faults reconnect
    /// transparently; unacknowledged deliveries return to the queue.
    /// Handler errors are the handler's problem: the delivery is
    /// acknowledged either way and never requeued here.
    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_round_trip() {
        let message = CrawlMessage::for_request(42);
        let decoded = CrawlMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.id, message.id);
    }

    #[test]
    fn garbage_payload_is_a_serialization_error() {
        let result = CrawlMessage::from_bytes(b"not json");
        assert!(matches!(result, Err(CrawlerError::Serialization(_))));
    }
}
