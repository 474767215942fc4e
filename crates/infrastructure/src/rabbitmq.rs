use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use metrics::counter;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use flightcrawl_core::config::MessageQueueConfig;
use flightcrawl_core::{CrawlerError, Result, RetryPolicy};
use flightcrawl_domain::{CrawlMessage, MessageHandler, MessageQueue};

/// RabbitMQ-backed queue channel.
///
/// Queues are declared durable and messages published persistent, so both
/// survive a broker restart. Connections are opened per publish or consume
/// attempt; the consume loop reconnects forever on connection faults and
/// only a shutdown signal ends it.
pub struct RabbitMqQueue {
    config: MessageQueueConfig,
}

impl RabbitMqQueue {
    pub fn new(config: MessageQueueConfig) -> Self {
        Self { config }
    }

    /// Open a broker connection. amqps:// urls (managed brokers) negotiate
    /// TLS through the connector, which only offers the ECDHE+AES-GCM
    /// suite family.
    async fn connect(&self) -> Result<Connection> {
        if self.config.requires_tls() {
            info!("connecting to broker over TLS");
        }

        Connection::connect(&self.config.url, ConnectionProperties::default())
            .await
            .map_err(|e| CrawlerError::Connection(format!("failed to connect to broker: {e}")))
    }

    async fn declare_queue(&self, channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                CrawlerError::Connection(format!("failed to declare queue {queue}: {e}"))
            })?;

        Ok(())
    }

    /// One connect/declare/consume pass. Returns `Ok` only on shutdown;
    /// any broker fault maps to a `Connection` error for the outer retry.
    async fn consume_once(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let connection = self.connect().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| CrawlerError::Connection(format!("failed to open channel: {e}")))?;

        // bound in-flight work per consumer
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| CrawlerError::Connection(format!("failed to set prefetch: {e}")))?;

        self.declare_queue(&channel, queue).await?;

        let mut consumer = channel
            .basic_consume(
                queue,
                "flightcrawl-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| CrawlerError::Connection(format!("failed to start consumer: {e}")))?;

        info!("waiting for messages on queue {queue}");

        loop {
            tokio::select! {
                delivery = consumer.next() => {
                    let delivery = match delivery {
                        Some(Ok(delivery)) => delivery,
                        Some(Err(e)) => {
                            return Err(CrawlerError::Connection(format!(
                                "delivery stream failed on queue {queue}: {e}"
                            )));
                        }
                        None => {
                            return Err(CrawlerError::Connection(format!(
                                "delivery stream ended on queue {queue}"
                            )));
                        }
                    };

                    counter!("flightcrawl_messages_consumed_total").increment(1);

                    match CrawlMessage::from_bytes(&delivery.data) {
                        Ok(message) => {
                            if let Err(e) = handler.handle(message).await {
                                // terminal for the message, not the consumer
                                error!("handler failed on queue {queue}: {e}");
                            }
                        }
                        Err(e) => warn!("discarding undecodable message on queue {queue}: {e}"),
                    }

                    delivery
                        .ack(BasicAckOptions::default())
                        .await
                        .map_err(|e| {
                            CrawlerError::Connection(format!("failed to ack delivery: {e}"))
                        })?;
                }
                _ = shutdown.recv() => {
                    info!("interrupt received, closing consumer on queue {queue}");
                    // unacked deliveries return to the queue on close
                    let _ = channel.close(200, "consumer shutdown").await;
                    let _ = connection.close(200, "consumer shutdown").await;
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl MessageQueue for RabbitMqQueue {
    async fn publish(&self, queue: &str, message: &CrawlMessage) -> Result<()> {
        let connection = self.connect().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| CrawlerError::Connection(format!("failed to open channel: {e}")))?;

        self.declare_queue(&channel, queue).await?;

        let payload = message.to_bytes()?;

        // delivery mode 2 = persistent; the confirm future is dropped
        // unawaited, at-most-once from the publisher's point of view
        let _confirm = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| {
                CrawlerError::MessageQueue(format!("failed to publish to queue {queue}: {e}"))
            })?;

        counter!("flightcrawl_messages_published_total").increment(1);

        let _ = connection.close(200, "publish complete").await;

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let policy = RetryPolicy::fixed(Duration::from_secs(self.config.reconnect_delay_seconds));
        let shutdown = Arc::new(Mutex::new(shutdown));

        policy
            .run(
                || {
                    let handler = Arc::clone(&handler);
                    let shutdown = Arc::clone(&shutdown);
                    async move {
                        let mut shutdown = shutdown.lock().await;
                        self.consume_once(queue, handler, &mut shutdown).await
                    }
                },
                CrawlerError::is_connection_fault,
            )
            .await
    }
}
