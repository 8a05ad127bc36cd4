//! Ports of the timeline core. Adapters live in the submodules and in `clients`.

pub mod postgres;
pub mod redis_bucket;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{DayBucket, DayKey, OutboundEvent, Post, TimelineReference, UserTimeline};
use crate::error::TimelineResult;

pub use postgres::PostgresTimelineRepository;
pub use redis_bucket::RedisDayBucketStore;

/// Read access to the post service.
#[async_trait::async_trait]
pub trait PostGateway: Send + Sync {
    /// Fails with `PostNotFound` when the post does not exist
    async fn get_post(&self, post_id: &str) -> TimelineResult<Post>;

    /// Batched lookup. Order is not guaranteed and unknown ids are omitted.
    async fn mget_posts(&self, post_ids: &[String]) -> TimelineResult<Vec<Post>>;
}

#[async_trait::async_trait]
pub trait FollowerGateway: Send + Sync {
    async fn get_follower_ids(&self, user_id: &str) -> TimelineResult<Vec<String>>;
}

/// Durable timeline references (source of truth).
#[async_trait::async_trait]
pub trait TimelineRepository: Send + Sync {
    async fn get_reference(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> TimelineResult<Option<TimelineReference>>;

    /// Inserts the reference if absent and makes sure the timeline header exists
    async fn add_reference(&self, reference: &TimelineReference) -> TimelineResult<()>;

    async fn remove_reference(&self, user_id: &str, post_id: &str) -> TimelineResult<()>;

    /// Most recent references first
    async fn get_references(&self, user_id: &str, limit: i64)
        -> TimelineResult<Vec<TimelineReference>>;

    /// References with `from <= published_at <= to`, most recent first
    async fn get_references_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TimelineResult<Vec<TimelineReference>>;

    async fn get_user_timeline(&self, user_id: &str) -> TimelineResult<Option<UserTimeline>>;

    /// Idempotent
    async fn create_user_timeline(&self, user_id: &str) -> TimelineResult<UserTimeline>;
}

/// Day-bucket cache.
///
/// Writes are conditional: every bucket's `version` must equal the stored
/// version (0 for a bucket that does not exist yet), otherwise the write
/// fails with `TimelineError::Conflict` and nothing is written.
#[async_trait::async_trait]
pub trait DayBucketStore: Send + Sync {
    /// Returns only the days that have a bucket record
    async fn get_many(
        &self,
        user_id: &str,
        days: &[DayKey],
    ) -> TimelineResult<HashMap<DayKey, DayBucket>>;

    /// All-or-nothing write of every bucket
    async fn put_many(&self, buckets: &[DayBucket]) -> TimelineResult<()>;

    async fn get(&self, user_id: &str, day: DayKey) -> TimelineResult<Option<DayBucket>> {
        let mut found = self.get_many(user_id, &[day]).await?;
        Ok(found.remove(&day))
    }

    async fn put(&self, bucket: &DayBucket) -> TimelineResult<()> {
        self.put_many(std::slice::from_ref(bucket)).await
    }
}

/// Broker publishing.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: OutboundEvent) -> TimelineResult<()>;
}
