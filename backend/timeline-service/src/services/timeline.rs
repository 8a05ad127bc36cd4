//! Timeline-fill service: keeps per-day cached copies of post snapshots in
//! sync with the timeline references and serves reads cache-aside.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::cleanup::{CleanupJob, CleanupPool};
use super::retry_on_conflict;
use crate::config::Config;
use crate::domain::{
    partition_by_day, BucketChange, DayBucket, DayKey, DayTimelineQuery, Post, TimelineFilled,
    TimelineReference,
};
use crate::error::TimelineResult;
use crate::metrics;
use crate::repository::{DayBucketStore, PostGateway, TimelineRepository};

#[derive(Debug, Clone, Copy)]
pub struct TimelineSettings {
    pub max_range_days: i64,
    pub max_posts: i64,
    pub max_conflict_retries: u32,
}

impl TimelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_range_days: config.timeline.max_range_days,
            max_posts: config.timeline.max_posts,
            max_conflict_retries: config.redis.max_conflict_retries,
        }
    }
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            max_range_days: 31,
            max_posts: 200,
            max_conflict_retries: 5,
        }
    }
}

pub struct TimelineFillService {
    posts: Arc<dyn PostGateway>,
    references: Arc<dyn TimelineRepository>,
    buckets: Arc<dyn DayBucketStore>,
    cleanup: CleanupPool,
    settings: TimelineSettings,
}

impl TimelineFillService {
    pub fn new(
        posts: Arc<dyn PostGateway>,
        references: Arc<dyn TimelineRepository>,
        buckets: Arc<dyn DayBucketStore>,
        cleanup: CleanupPool,
        settings: TimelineSettings,
    ) -> Self {
        Self {
            posts,
            references,
            buckets,
            cleanup,
            settings,
        }
    }

    /// Adds a post to a user's timeline: durable reference plus cached snapshot.
    pub async fn add_post(&self, post_id: &str, user_id: &str) -> TimelineResult<()> {
        let started = Instant::now();
        let post = self.posts.get_post(post_id).await?;

        if self.references.get_reference(user_id, post_id).await?.is_none() {
            self.references
                .add_reference(&TimelineReference {
                    user_id: user_id.to_string(),
                    post_id: post.id.clone(),
                    published_at: post.published_at,
                })
                .await?;
        }

        self.add_posts(user_id, vec![post]).await?;

        metrics::record_operation_duration("add_post", started.elapsed());
        info!(user_id = %user_id, post_id = %post_id, "Post added to timeline");
        Ok(())
    }

    /// Merges snapshots into their day buckets and writes every touched bucket atomically.
    pub async fn add_posts(&self, user_id: &str, posts: Vec<Post>) -> TimelineResult<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let by_day = &partition_by_day(posts);
        let days = &by_day.keys().copied().collect::<Vec<_>>();

        retry_on_conflict("add_posts", self.settings.max_conflict_retries, || async move {
            let mut existing = self.buckets.get_many(user_id, days).await?;
            let mut dirty = Vec::with_capacity(days.len());

            for (day, posts) in by_day {
                let mut bucket = existing
                    .remove(day)
                    .unwrap_or_else(|| DayBucket::empty(user_id, *day));
                let mut changed = false;

                for post in posts {
                    match bucket.upsert(post.clone()) {
                        BucketChange::Stale => {
                            metrics::record_stale_discard();
                            debug!(
                                user_id = %user_id,
                                post_id = %post.id,
                                "Discarded stale post snapshot"
                            );
                        }
                        BucketChange::Inserted | BucketChange::Replaced => changed = true,
                    }
                }

                if changed {
                    dirty.push(bucket);
                }
            }

            self.buckets.put_many(&dirty).await
        })
        .await
    }

    /// Removes a post from a user's timeline. Cache cleanup runs in the background.
    pub async fn remove_post(&self, post_id: &str, user_id: &str) -> TimelineResult<()> {
        let post = self.posts.get_post(post_id).await?;
        self.references.remove_reference(user_id, post_id).await?;

        self.cleanup.submit(CleanupJob {
            user_id: user_id.to_string(),
            post_id: post.id.clone(),
            day: post.day_key(),
        });

        info!(user_id = %user_id, post_id = %post_id, "Post removed from timeline");
        Ok(())
    }

    /// Reads an inclusive day range, rebuilding the cache for the whole range on a miss.
    pub async fn get_day_user_timeline_filled(
        &self,
        user_id: &str,
        query: &DayTimelineQuery,
    ) -> TimelineResult<TimelineFilled> {
        let range = query.to_range(self.settings.max_range_days)?;
        let started = Instant::now();
        let days = range.days();

        let cached = self.buckets.get_many(user_id, &days).await?;
        if cached.len() == days.len() {
            metrics::record_cache_read("range", "hit");
            let last_update = latest_update(cached.values());
            let posts = cached.into_values().flat_map(|b| b.posts).collect();
            metrics::record_operation_duration("range_read", started.elapsed());
            return Ok(TimelineFilled::new(user_id, posts, last_update));
        }

        metrics::record_cache_read("range", "miss");
        debug!(
            user_id = %user_id,
            from = %range.from,
            to = %range.to,
            cached_days = cached.len(),
            "Day range not fully cached, rebuilding"
        );

        let references = self
            .references
            .get_references_in_range(user_id, range.start(), range.end())
            .await?;
        let posts = self.hydrate(&references).await?;
        self.populate(user_id, &days, &posts).await?;

        metrics::record_operation_duration("range_read", started.elapsed());
        Ok(TimelineFilled::new(user_id, posts, Utc::now()))
    }

    /// Reads the most recent part of a user's timeline, creating an empty one for unknown users.
    pub async fn get_user_timeline(&self, user_id: &str) -> TimelineResult<TimelineFilled> {
        if self.references.get_user_timeline(user_id).await?.is_none() {
            return self.create_user_timeline(user_id).await;
        }

        let references = self
            .references
            .get_references(user_id, self.settings.max_posts)
            .await?;
        if references.is_empty() {
            return Ok(TimelineFilled::empty(user_id));
        }

        let days: Vec<DayKey> = references
            .iter()
            .map(|r| DayKey::from_datetime(r.published_at))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // A full page may cut the oldest day short; such a day is served but never cached.
        let partial_day = (references.len() as i64 >= self.settings.max_posts)
            .then(|| days.first().copied())
            .flatten();

        let cached = self.buckets.get_many(user_id, &days).await?;
        let missing_days: Vec<DayKey> = days
            .iter()
            .copied()
            .filter(|day| !cached.contains_key(day))
            .collect();

        let mut last_update = latest_update(cached.values());
        let mut by_id: HashMap<String, Post> = cached
            .into_values()
            .flat_map(|b| b.posts)
            .map(|p| (p.id.clone(), p))
            .collect();

        if missing_days.is_empty() {
            metrics::record_cache_read("all", "hit");
        } else {
            metrics::record_cache_read("all", "miss");
            let missing: BTreeSet<DayKey> = missing_days.iter().copied().collect();
            let to_hydrate: Vec<TimelineReference> = references
                .iter()
                .filter(|r| missing.contains(&DayKey::from_datetime(r.published_at)))
                .cloned()
                .collect();

            let hydrated = self.hydrate(&to_hydrate).await?;
            let complete_days: Vec<DayKey> = missing_days
                .iter()
                .copied()
                .filter(|day| Some(*day) != partial_day)
                .collect();
            if !complete_days.is_empty() {
                self.populate(user_id, &complete_days, &hydrated).await?;
            }
            last_update = Utc::now();
            by_id.extend(hydrated.into_iter().map(|p| (p.id.clone(), p)));
        }

        let posts = references
            .iter()
            .filter_map(|r| by_id.remove(&r.post_id))
            .collect();
        Ok(TimelineFilled::new(user_id, posts, last_update))
    }

    /// Persists an empty timeline header and returns the empty timeline.
    pub async fn create_user_timeline(&self, user_id: &str) -> TimelineResult<TimelineFilled> {
        let header = self.references.create_user_timeline(user_id).await?;
        info!(user_id = %user_id, "Created empty user timeline");
        Ok(TimelineFilled::new(user_id, Vec::new(), header.created_at))
    }

    /// One batched lookup, returned in reference order. Unknown posts are omitted.
    async fn hydrate(&self, references: &[TimelineReference]) -> TimelineResult<Vec<Post>> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = references.iter().map(|r| r.post_id.clone()).collect();
        let mut by_id: HashMap<String, Post> = self
            .posts
            .mget_posts(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Writes a bucket record for every day in `days`, empty where no post falls on the day.
    async fn populate(&self, user_id: &str, days: &[DayKey], posts: &[Post]) -> TimelineResult<()> {
        let by_day: &BTreeMap<DayKey, Vec<Post>> = &partition_by_day(posts.to_vec());

        retry_on_conflict("populate", self.settings.max_conflict_retries, || async move {
            let mut existing = self.buckets.get_many(user_id, days).await?;
            let buckets: Vec<DayBucket> = days
                .iter()
                .map(|day| {
                    let mut bucket = existing
                        .remove(day)
                        .unwrap_or_else(|| DayBucket::empty(user_id, *day));
                    for post in by_day.get(day).into_iter().flatten() {
                        bucket.upsert(post.clone());
                    }
                    bucket
                })
                .collect();

            self.buckets.put_many(&buckets).await
        })
        .await?;

        debug!(user_id = %user_id, days = days.len(), posts = posts.len(), "Populated day buckets");
        Ok(())
    }
}

fn latest_update<'a>(buckets: impl Iterator<Item = &'a DayBucket>) -> DateTime<Utc> {
    buckets
        .map(|b| b.last_update)
        .max()
        .unwrap_or_else(Utc::now)
}
