//! In-memory ports shared by the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use timeline_service::domain::{
    ContentBlock, DayBucket, DayKey, OutboundEvent, Post, TimelineReference, UserTimeline,
};
use timeline_service::error::{TimelineError, TimelineResult};
use timeline_service::repository::{
    DayBucketStore, EventPublisher, FollowerGateway, PostGateway, TimelineRepository,
};
use timeline_service::services::{CleanupPool, TimelineFillService, TimelineSettings};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn post(id: &str, published_at: DateTime<Utc>) -> Post {
    Post {
        id: id.to_string(),
        contents: vec![ContentBlock::text(format!("post {}", id))],
        author_id: "author-1".to_string(),
        published_at,
        updated_at: published_at,
    }
}

// ---------------------------------------------------------------------------
// Day-bucket store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBucketStore {
    buckets: Mutex<HashMap<(String, DayKey), DayBucket>>,
    fail_writes: AtomicBool,
    conflicts_to_inject: AtomicU32,
    pub writes: AtomicUsize,
}

impl InMemoryBucketStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The next `n` writes fail with a version conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts_to_inject.store(n, Ordering::SeqCst);
    }

    pub fn bucket(&self, user_id: &str, day: DayKey) -> Option<DayBucket> {
        self.buckets
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), day))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DayBucketStore for InMemoryBucketStore {
    async fn get_many(
        &self,
        user_id: &str,
        days: &[DayKey],
    ) -> TimelineResult<HashMap<DayKey, DayBucket>> {
        let buckets = self.buckets.lock().unwrap();
        Ok(days
            .iter()
            .filter_map(|day| {
                buckets
                    .get(&(user_id.to_string(), *day))
                    .map(|b| (*day, b.clone()))
            })
            .collect())
    }

    async fn put_many(&self, batch: &[DayBucket]) -> TimelineResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TimelineError::Internal("injected write failure".into()));
        }
        if self
            .conflicts_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TimelineError::Conflict("injected conflict".into()));
        }

        let mut buckets = self.buckets.lock().unwrap();
        for bucket in batch {
            let stored = buckets
                .get(&(bucket.user_id.clone(), bucket.day))
                .map(|b| b.version)
                .unwrap_or(0);
            if stored != bucket.version {
                return Err(TimelineError::Conflict(format!("bucket {}", bucket.day)));
            }
        }
        for bucket in batch {
            let mut next = bucket.clone();
            next.version += 1;
            buckets.insert((bucket.user_id.clone(), bucket.day), next);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Post gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakePostGateway {
    posts: Mutex<HashMap<String, Post>>,
    pub get_calls: AtomicUsize,
    pub mget_calls: AtomicUsize,
}

impl FakePostGateway {
    pub fn with_posts(posts: Vec<Post>) -> Arc<Self> {
        let gateway = Self::default();
        gateway.set_posts(posts);
        Arc::new(gateway)
    }

    pub fn set_posts(&self, posts: Vec<Post>) {
        let mut stored = self.posts.lock().unwrap();
        for post in posts {
            stored.insert(post.id.clone(), post);
        }
    }

    pub fn mget_calls(&self) -> usize {
        self.mget_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PostGateway for FakePostGateway {
    async fn get_post(&self, post_id: &str) -> TimelineResult<Post> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.posts
            .lock()
            .unwrap()
            .get(post_id)
            .cloned()
            .ok_or_else(|| TimelineError::PostNotFound(post_id.to_string()))
    }

    async fn mget_posts(&self, post_ids: &[String]) -> TimelineResult<Vec<Post>> {
        self.mget_calls.fetch_add(1, Ordering::SeqCst);
        let posts = self.posts.lock().unwrap();
        // reversed so callers cannot rely on gateway order
        Ok(post_ids
            .iter()
            .rev()
            .filter_map(|id| posts.get(id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Timeline references
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryTimelineRepository {
    headers: Mutex<HashMap<String, UserTimeline>>,
    references: Mutex<Vec<TimelineReference>>,
    pub touched: AtomicUsize,
}

impl InMemoryTimelineRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn references_of(&self, user_id: &str) -> Vec<TimelineReference> {
        self.references
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn has_header(&self, user_id: &str) -> bool {
        self.headers.lock().unwrap().contains_key(user_id)
    }

    fn touch(&self) {
        self.touched.fetch_add(1, Ordering::SeqCst);
    }

    fn sorted_desc(&self, user_id: &str) -> Vec<TimelineReference> {
        let mut refs = self.references_of(user_id);
        refs.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        refs
    }
}

#[async_trait::async_trait]
impl TimelineRepository for InMemoryTimelineRepository {
    async fn get_reference(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> TimelineResult<Option<TimelineReference>> {
        self.touch();
        Ok(self
            .references_of(user_id)
            .into_iter()
            .find(|r| r.post_id == post_id))
    }

    async fn add_reference(&self, reference: &TimelineReference) -> TimelineResult<()> {
        self.touch();
        self.headers
            .lock()
            .unwrap()
            .entry(reference.user_id.clone())
            .or_insert_with(|| UserTimeline {
                user_id: reference.user_id.clone(),
                created_at: Utc::now(),
            });
        let mut refs = self.references.lock().unwrap();
        if !refs
            .iter()
            .any(|r| r.user_id == reference.user_id && r.post_id == reference.post_id)
        {
            refs.push(reference.clone());
        }
        Ok(())
    }

    async fn remove_reference(&self, user_id: &str, post_id: &str) -> TimelineResult<()> {
        self.touch();
        self.references
            .lock()
            .unwrap()
            .retain(|r| !(r.user_id == user_id && r.post_id == post_id));
        Ok(())
    }

    async fn get_references(
        &self,
        user_id: &str,
        limit: i64,
    ) -> TimelineResult<Vec<TimelineReference>> {
        self.touch();
        Ok(self
            .sorted_desc(user_id)
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn get_references_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TimelineResult<Vec<TimelineReference>> {
        self.touch();
        Ok(self
            .sorted_desc(user_id)
            .into_iter()
            .filter(|r| r.published_at >= from && r.published_at <= to)
            .collect())
    }

    async fn get_user_timeline(&self, user_id: &str) -> TimelineResult<Option<UserTimeline>> {
        self.touch();
        Ok(self.headers.lock().unwrap().get(user_id).cloned())
    }

    async fn create_user_timeline(&self, user_id: &str) -> TimelineResult<UserTimeline> {
        self.touch();
        Ok(self
            .headers
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert_with(|| UserTimeline {
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            })
            .clone())
    }
}

// ---------------------------------------------------------------------------
// Broker and follow service
// ---------------------------------------------------------------------------

/// Records published events; publishing for users in `failing_users` fails.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<OutboundEvent>>,
    failing_users: HashSet<String>,
}

impl RecordingPublisher {
    pub fn failing_for(users: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            failing_users: users.iter().map(|u| u.to_string()).collect(),
        })
    }

    pub fn published_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait::async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: OutboundEvent) -> TimelineResult<()> {
        if self.failing_users.contains(&event.key) {
            return Err(TimelineError::Broker(format!("broker rejected {}", event.key)));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

pub struct StaticFollowers(pub Vec<String>);

impl StaticFollowers {
    pub fn of(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self(ids.iter().map(|s| s.to_string()).collect()))
    }
}

#[async_trait::async_trait]
impl FollowerGateway for StaticFollowers {
    async fn get_follower_ids(&self, _user_id: &str) -> TimelineResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Service wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<TimelineFillService>,
    pub posts: Arc<FakePostGateway>,
    pub references: Arc<InMemoryTimelineRepository>,
    pub buckets: Arc<InMemoryBucketStore>,
}

pub fn harness(posts: Vec<Post>) -> Harness {
    harness_with(posts, TimelineSettings::default())
}

pub fn harness_with(posts: Vec<Post>, settings: TimelineSettings) -> Harness {
    let posts = FakePostGateway::with_posts(posts);
    let references = InMemoryTimelineRepository::new();
    let buckets = InMemoryBucketStore::new();
    let (cleanup, _workers) = CleanupPool::start(buckets.clone(), 1, 16, 5);

    let service = Arc::new(TimelineFillService::new(
        posts.clone(),
        references.clone(),
        buckets.clone(),
        cleanup,
        settings,
    ));

    Harness {
        service,
        posts,
        references,
        buckets,
    }
}
