use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{DayKey, Post};

/// Outcome of merging one post snapshot into a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketChange {
    Inserted,
    Replaced,
    /// Incoming snapshot was not newer than the stored one and was dropped.
    Stale,
}

/// All cached post snapshots of one user for one UTC day.
///
/// `version` is the optimistic-concurrency token of the stored record.
/// Zero means the bucket has never been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub user_id: String,
    pub day: DayKey,
    pub posts: Vec<Post>,
    pub last_update: DateTime<Utc>,
    pub version: u64,
}

impl DayBucket {
    pub fn empty(user_id: impl Into<String>, day: DayKey) -> Self {
        Self {
            user_id: user_id.into(),
            day,
            posts: Vec::new(),
            last_update: Utc::now(),
            version: 0,
        }
    }

    pub fn with_posts(user_id: impl Into<String>, day: DayKey, posts: Vec<Post>) -> Self {
        let mut bucket = Self::empty(user_id, day);
        for post in posts {
            bucket.upsert(post);
        }
        bucket
    }

    /// Merge a snapshot with last-writer-wins on `updated_at`. Ties keep the existing snapshot.
    pub fn upsert(&mut self, post: Post) -> BucketChange {
        match self.posts.iter().position(|p| p.id == post.id) {
            Some(idx) if !post.supersedes(&self.posts[idx]) => BucketChange::Stale,
            Some(idx) => {
                self.posts[idx] = post;
                self.touch();
                BucketChange::Replaced
            }
            None => {
                self.posts.push(post);
                self.touch();
                BucketChange::Inserted
            }
        }
    }

    /// Drops a snapshot. The bucket itself stays, possibly empty.
    pub fn remove(&mut self, post_id: &str) -> bool {
        let before = self.posts.len();
        self.posts.retain(|p| p.id != post_id);
        let removed = self.posts.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}

/// Groups posts by the UTC day of their publication.
pub fn partition_by_day(posts: Vec<Post>) -> BTreeMap<DayKey, Vec<Post>> {
    let mut days: BTreeMap<DayKey, Vec<Post>> = BTreeMap::new();
    for post in posts {
        days.entry(post.day_key()).or_default().push(post);
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentBlock;
    use chrono::{Duration, TimeZone};

    fn post_at(id: &str, published_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Post {
        Post {
            id: id.into(),
            contents: vec![ContentBlock::text(format!("body of {}", id))],
            author_id: "author".into(),
            published_at,
            updated_at,
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let at = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let mut bucket = DayBucket::empty("u1", DayKey::from_datetime(at));

        assert_eq!(bucket.upsert(post_at("p1", at, at)), BucketChange::Inserted);
        let once = bucket.posts.clone();
        assert_eq!(bucket.upsert(post_at("p1", at, at)), BucketChange::Stale);
        assert_eq!(bucket.posts, once);
    }

    #[test]
    fn test_last_writer_wins_on_updated_at() {
        let at = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let newer = at + Duration::minutes(5);
        let mut bucket = DayBucket::empty("u1", DayKey::from_datetime(at));

        bucket.upsert(post_at("p1", at, newer));
        assert_eq!(bucket.upsert(post_at("p1", at, at)), BucketChange::Stale);
        assert_eq!(bucket.posts[0].updated_at, newer);

        let newest = newer + Duration::minutes(5);
        assert_eq!(bucket.upsert(post_at("p1", at, newest)), BucketChange::Replaced);
        assert_eq!(bucket.posts.len(), 1);
        assert_eq!(bucket.posts[0].updated_at, newest);
    }

    #[test]
    fn test_remove_keeps_empty_bucket() {
        let at = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        let mut bucket = DayBucket::with_posts("u1", DayKey::from_datetime(at), vec![post_at("p1", at, at)]);

        assert!(bucket.remove("p1"));
        assert!(bucket.posts.is_empty());
        assert!(!bucket.remove("p1"));
    }

    #[test]
    fn test_partition_by_day_splits_at_midnight() {
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 1, 11, 0, 1, 0).unwrap();
        let days = partition_by_day(vec![post_at("p1", late, late), post_at("p2", early, early)]);

        assert_eq!(days.len(), 2);
        assert_eq!(days[&DayKey::from_datetime(late)][0].id, "p1");
        assert_eq!(days[&DayKey::from_datetime(early)][0].id, "p2");
    }
}
