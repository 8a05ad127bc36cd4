use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::domain::{AddPostToTimelineEvent, PostCreatedEvent, RemovePostFromTimelineEvent};
use crate::error::{TimelineError, TimelineResult};
use crate::metrics;
use crate::services::{FanOutPublisher, TimelineFillService};

/// What the consumer loop does with a message after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit the offset.
    Ack,
    /// Leave the offset uncommitted and rewind to this message.
    Redeliver,
}

impl Disposition {
    fn label(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Redeliver => "redeliver",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopicNames {
    pub post_created: String,
    pub add_post: String,
    pub remove_post: String,
}

impl From<&KafkaConfig> for TopicNames {
    fn from(config: &KafkaConfig) -> Self {
        Self {
            post_created: config.post_created_topic.clone(),
            add_post: config.add_post_topic.clone(),
            remove_post: config.remove_post_topic.clone(),
        }
    }
}

impl TopicNames {
    pub fn all(&self) -> [&str; 3] {
        [&self.post_created, &self.add_post, &self.remove_post]
    }
}

/// Maps a topic and payload to the matching timeline operation.
pub struct MessageRouter {
    topics: TopicNames,
    fanout: Arc<FanOutPublisher>,
    timeline: Arc<TimelineFillService>,
}

impl MessageRouter {
    pub fn new(
        topics: TopicNames,
        fanout: Arc<FanOutPublisher>,
        timeline: Arc<TimelineFillService>,
    ) -> Self {
        Self {
            topics,
            fanout,
            timeline,
        }
    }

    pub fn topics(&self) -> &TopicNames {
        &self.topics
    }

    /// Only a successfully handled message is acknowledged. Undecodable
    /// payloads are acknowledged too since redelivery cannot fix them.
    pub async fn dispatch(&self, topic: &str, payload: Option<&[u8]>) -> Disposition {
        let Some(data) = payload else {
            debug!(topic = %topic, "Received Kafka message with empty payload");
            metrics::record_consumer_message(topic, "empty");
            return Disposition::Ack;
        };

        let result = if topic == self.topics.post_created {
            match decode::<PostCreatedEvent>(topic, data) {
                Some(event) => self.handle_post_created(event).await,
                None => return Disposition::Ack,
            }
        } else if topic == self.topics.add_post {
            match decode::<AddPostToTimelineEvent>(topic, data) {
                Some(event) => self.timeline.add_post(&event.post_id, &event.user_id).await,
                None => return Disposition::Ack,
            }
        } else if topic == self.topics.remove_post {
            match decode::<RemovePostFromTimelineEvent>(topic, data) {
                Some(event) => {
                    self.timeline
                        .remove_post(&event.post_id, &event.user_id)
                        .await
                }
                None => return Disposition::Ack,
            }
        } else {
            debug!(topic = %topic, "Ignoring message from unknown topic");
            metrics::record_consumer_message(topic, "ignored");
            return Disposition::Ack;
        };

        match result {
            Ok(()) => {
                metrics::record_consumer_message(topic, Disposition::Ack.label());
                Disposition::Ack
            }
            Err(e) => {
                if e.is_not_found() {
                    warn!(
                        topic = %topic,
                        error = %e,
                        "Referenced post not found, partition blocked until it exists"
                    );
                } else {
                    warn!(topic = %topic, error = %e, "Timeline event handling failed, scheduling redelivery");
                }
                metrics::record_consumer_message(topic, redelivery_label(&e));
                Disposition::Redeliver
            }
        }
    }

    async fn handle_post_created(&self, event: PostCreatedEvent) -> TimelineResult<()> {
        let report = self
            .fanout
            .split_post_update_for_users(&event.id, &event.author_id)
            .await?;
        info!(
            post_id = %event.id,
            author_id = %event.author_id,
            followers = report.followers,
            failed = report.failed,
            "Handled post created event"
        );
        Ok(())
    }
}

/// Metric label for a failed message, keeping missing entities apart from other failures.
fn redelivery_label(error: &TimelineError) -> &'static str {
    if error.is_not_found() {
        "redeliver_not_found"
    } else {
        Disposition::Redeliver.label()
    }
}

fn decode<T: DeserializeOwned>(topic: &str, data: &[u8]) -> Option<T> {
    match serde_json::from_slice(data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(topic = %topic, error = %e, "Dropping undecodable Kafka message");
            metrics::record_consumer_message(topic, "poison");
            None
        }
    }
}
