use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use flightcrawl_core::Result;
use flightcrawl_domain::{
    CrawlMessage, MessageHandler, MessageQueue, Request, RequestCreate, RequestRepository,
    RequestStatus,
};

/// Mock implementation of RequestRepository for testing
#[derive(Debug, Clone)]
pub struct MockRequestRepository {
    rows: Arc<Mutex<HashMap<i64, Request>>>,
    next_id: Arc<Mutex<i64>>,
}

impl Default for MockRequestRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRequestRepository {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_requests(requests: Vec<Request>) -> Self {
        let mut rows = HashMap::new();
        let mut max_id = 0;

        for request in requests {
            if request.id > max_id {
                max_id = request.id;
            }
            rows.insert(request.id, request);
        }

        Self {
            rows: Arc::new(Mutex::new(rows)),
            next_id: Arc::new(Mutex::new(max_id + 1)),
        }
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<Request> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl RequestRepository for MockRequestRepository {
    async fn create_or_get(&self, create: &RequestCreate) -> Result<Request> {
        let mut rows = self.rows.lock().unwrap();

        if let Some(existing) = rows.values().find(|row| create.matches(row)) {
            return Ok(existing.clone());
        }

        let mut next_id = self.next_id.lock().unwrap();
        let request = create.to_request(*next_id, Utc::now());
        *next_id += 1;

        rows.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Request>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn update_status(&self, id: i64, status: RequestStatus) -> Result<()> {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.status = Some(status);
        }
        Ok(())
    }
}

/// Queue double that records published messages and, on consume, drains
/// everything recorded for the queue through the handler before returning.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    published: Arc<Mutex<Vec<(String, CrawlMessage)>>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, CrawlMessage)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn publish(&self, queue: &str, message: &CrawlMessage) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((queue.to_string(), message.clone()));
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        _shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let pending: Vec<CrawlMessage> = self
            .published
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == queue)
            .map(|(_, message)| message.clone())
            .collect();

        for message in pending {
            // parity with the broker loop: handler errors are terminal for
            // the message, not for the consumer
            let _ = handler.handle(message).await;
        }

        Ok(())
    }
}
