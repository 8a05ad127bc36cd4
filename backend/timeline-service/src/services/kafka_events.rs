//! Kafka producer for timeline commands

use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::OutboundEvent;
use crate::error::{TimelineError, TimelineResult};
use crate::repository::EventPublisher;

#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    source: String,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str, client_id: &str) -> TimelineResult<Self> {
        let producer = rdkafka::config::ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", client_id)
            // Idempotency and reliability settings
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("linger.ms", "5")
            .create::<FutureProducer>()
            .map_err(|e| TimelineError::Broker(format!("producer init failed: {}", e)))?;

        info!(brokers = %brokers, "Timeline Kafka producer initialized");

        Ok(Self {
            producer,
            source: client_id.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: OutboundEvent) -> TimelineResult<()> {
        let correlation_id = Uuid::new_v4().to_string();
        // event_type header lets consumers route without decoding the payload
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event_type",
                value: Some(event.topic.as_str()),
            })
            .insert(Header {
                key: "source",
                value: Some(self.source.as_str()),
            })
            .insert(Header {
                key: "correlation_id",
                value: Some(correlation_id.as_str()),
            });

        let record = FutureRecord::to(&event.topic)
            .key(&event.key)
            .payload(&event.payload)
            .headers(headers);

        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %event.topic,
                    key = %event.key,
                    correlation_id = %correlation_id,
                    partition,
                    offset,
                    "Published timeline event"
                );
                Ok(())
            }
            Err((err, _)) => {
                warn!(
                    error = ?err,
                    topic = %event.topic,
                    key = %event.key,
                    "Failed to publish timeline event"
                );
                Err(TimelineError::Broker(format!(
                    "publish to {} failed: {}",
                    event.topic, err
                )))
            }
        }
    }
}
