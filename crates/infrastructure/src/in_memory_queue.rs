use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info};

use flightcrawl_core::{CrawlerError, Result};
use flightcrawl_domain::{CrawlMessage, MessageHandler, MessageQueue};

/// In-process queue over tokio channels for embedded deployments and
/// tests. Honors the same consume contract as the broker-backed channel:
/// blocks until shutdown, handler errors are terminal per message.
#[derive(Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<String, QueueChannel>>,
}

#[derive(Clone)]
struct QueueChannel {
    sender: mpsc::UnboundedSender<CrawlMessage>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<CrawlMessage>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, queue: &str) -> QueueChannel {
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                QueueChannel {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                }
            })
            .clone()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, queue: &str, message: &CrawlMessage) -> Result<()> {
        self.channel(queue)
            .await
            .sender
            .send(message.clone())
            .map_err(|e| CrawlerError::MessageQueue(format!("queue {queue} closed: {e}")))?;

        counter!("flightcrawl_messages_published_total").increment(1);

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let channel = self.channel(queue).await;
        let mut receiver = channel.receiver.lock().await;

        info!("waiting for messages on in-memory queue {queue}");

        loop {
            tokio::select! {
                message = receiver.recv() => {
                    // the sender half lives in the queue map, so recv only
                    // yields None once this queue instance is dropped
                    let Some(message) = message else { return Ok(()) };

                    counter!("flightcrawl_messages_consumed_total").increment(1);

                    if let Err(e) = handler.handle(message).await {
                        error!("handler failed on queue {queue}: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    info!("interrupt received, leaving in-memory queue {queue}");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct CountingHandler {
        seen: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: CrawlMessage) -> Result<()> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(CrawlerError::Crawl("boom".to_string()));
            }
            Ok(())
        }
    }

    async fn run_consume(
        queue: Arc<InMemoryQueue>,
        handler: Arc<CountingHandler>,
        expected: usize,
    ) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let consumer = {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler) as Arc<dyn MessageHandler>;
            tokio::spawn(async move { queue.consume("crawl_requests", handler, shutdown_rx).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.seen.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler never saw all messages");

        shutdown_tx.send(()).unwrap();
        consumer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn delivers_published_messages_in_order_until_shutdown() {
        let queue = Arc::new(InMemoryQueue::new());
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
            fail_first: false,
        });

        queue
            .publish("crawl_requests", &CrawlMessage::for_request(1))
            .await
            .unwrap();
        queue
            .publish("crawl_requests", &CrawlMessage::for_request(2))
            .await
            .unwrap();

        run_consume(queue, Arc::clone(&handler), 2).await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_failure_does_not_stop_the_loop() {
        let queue = Arc::new(InMemoryQueue::new());
        let handler = Arc::new(CountingHandler {
            seen: AtomicUsize::new(0),
            fail_first: true,
        });

        queue
            .publish("crawl_requests", &CrawlMessage::for_request(1))
            .await
            .unwrap();
        queue
            .publish("crawl_requests", &CrawlMessage::for_request(2))
            .await
            .unwrap();

        run_consume(queue, Arc::clone(&handler), 2).await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 2);
    }
}
