//! Timeline Events Consumer
//!
//! Consumes post creation events and per-user timeline commands. Offsets are
//! committed manually once the router acknowledges a message; a message that
//! must be redelivered rewinds its partition after a back-off.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::Offset;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::router::{Disposition, MessageRouter};

#[derive(Debug, Clone)]
pub struct TimelineEventsConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub redelivery_backoff: Duration,
}

pub struct TimelineEventsConsumer {
    router: Arc<MessageRouter>,
    config: TimelineEventsConsumerConfig,
}

impl TimelineEventsConsumer {
    pub fn new(router: Arc<MessageRouter>, config: TimelineEventsConsumerConfig) -> Self {
        Self { router, config }
    }

    /// Run the consumer loop
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_inner()
            .await
            .map_err(|e| anyhow::anyhow!("Timeline events consumer terminated: {}", e))
    }

    async fn run_inner(self) -> Result<(), KafkaError> {
        let topics = self.router.topics().all();
        info!(
            topics = ?topics,
            group = %self.config.group_id,
            "Starting timeline events consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&topics)?;

        loop {
            match consumer.recv().await {
                Ok(record) => {
                    let disposition = self.router.dispatch(record.topic(), record.payload()).await;

                    match disposition {
                        Disposition::Ack => {
                            if let Err(commit_err) =
                                consumer.commit_message(&record, CommitMode::Async)
                            {
                                warn!("Failed to commit Kafka offset: {}", commit_err);
                            }
                        }
                        Disposition::Redeliver => {
                            tokio::time::sleep(self.config.redelivery_backoff).await;
                            if let Err(seek_err) = consumer.seek(
                                record.topic(),
                                record.partition(),
                                Offset::Offset(record.offset()),
                                Duration::from_secs(5),
                            ) {
                                warn!(
                                    topic = %record.topic(),
                                    partition = record.partition(),
                                    offset = record.offset(),
                                    "Failed to rewind for redelivery: {}",
                                    seek_err
                                );
                            }
                        }
                    }
                }
                Err(err) => {
                    error!("Kafka error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
