use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{AddPostToTimelineEvent, OutboundEvent};
use crate::error::TimelineResult;
use crate::metrics;
use crate::repository::{EventPublisher, FollowerGateway};

/// Result of one fan-out pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOutReport {
    pub followers: usize,
    pub published: usize,
    pub failed: usize,
}

/// Turns a new post into one `user_timeline.add_post` command per follower of its author.
pub struct FanOutPublisher {
    followers: Arc<dyn FollowerGateway>,
    publisher: Arc<dyn EventPublisher>,
    add_post_topic: String,
    max_concurrency: usize,
}

impl FanOutPublisher {
    pub fn new(
        followers: Arc<dyn FollowerGateway>,
        publisher: Arc<dyn EventPublisher>,
        add_post_topic: impl Into<String>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            followers,
            publisher,
            add_post_topic: add_post_topic.into(),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Emits one event per follower with bounded concurrency and waits for all of them.
    ///
    /// A failed follower lookup fails the call. Individual publish failures are
    /// logged and counted but never fail the call or the other emissions.
    pub async fn split_post_update_for_users(
        &self,
        post_id: &str,
        author_id: &str,
    ) -> TimelineResult<FanOutReport> {
        let started = Instant::now();
        let followers = self.followers.get_follower_ids(author_id).await?;
        let total = followers.len();

        info!(
            post_id = %post_id,
            author_id = %author_id,
            followers = total,
            "Starting timeline fan-out"
        );

        let published = stream::iter(followers)
            .map(|follower_id| self.emit(post_id, follower_id))
            .buffer_unordered(self.max_concurrency)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        let report = FanOutReport {
            followers: total,
            published,
            failed: total - published,
        };

        metrics::record_fanout_emission("published", report.published as u64);
        metrics::record_fanout_emission("failed", report.failed as u64);
        metrics::record_operation_duration("fanout", started.elapsed());

        info!(
            post_id = %post_id,
            author_id = %author_id,
            published = report.published,
            failed = report.failed,
            "Timeline fan-out completed"
        );
        Ok(report)
    }

    async fn emit(&self, post_id: &str, follower_id: String) -> bool {
        let event = AddPostToTimelineEvent {
            post_id: post_id.to_string(),
            user_id: follower_id.clone(),
        };

        let outbound = match OutboundEvent::json(&self.add_post_topic, &follower_id, &event) {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(post_id = %post_id, user_id = %follower_id, error = %e, "Failed to encode fan-out event");
                return false;
            }
        };

        match self.publisher.publish(outbound).await {
            Ok(()) => {
                debug!(post_id = %post_id, user_id = %follower_id, "Fan-out event published");
                true
            }
            Err(e) => {
                warn!(post_id = %post_id, user_id = %follower_id, error = %e, "Fan-out event publish failed");
                false
            }
        }
    }
}
