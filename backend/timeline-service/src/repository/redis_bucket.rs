use redis::aio::ConnectionManager;
use redis::Script;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::DayBucketStore;
use crate::codec::{decode_bucket, encode_bucket};
use crate::domain::{DayBucket, DayKey};
use crate::error::{TimelineError, TimelineResult};

/// Checks every bucket version, then writes all of them or none.
///
/// KEYS: bucket keys. ARGV: expected versions (n), documents (n), ttl.
const CONDITIONAL_MULTI_PUT: &str = r#"
local n = #KEYS
for i = 1, n do
    local current = tonumber(redis.call('HGET', KEYS[i], 'version') or '0')
    if current ~= tonumber(ARGV[i]) then
        return 0
    end
end
local ttl = tonumber(ARGV[2 * n + 1])
for i = 1, n do
    redis.call('HSET', KEYS[i], 'version', tonumber(ARGV[i]) + 1, 'doc', ARGV[n + i])
    if ttl > 0 then
        redis.call('EXPIRE', KEYS[i], ttl)
    end
end
return 1
"#;

/// Day-bucket cache on Redis hashes (`version`, `doc`).
///
/// One user's buckets share the `{user:<id>}` hash tag so a multi-bucket
/// write stays on a single cluster slot.
#[derive(Clone)]
pub struct RedisDayBucketStore {
    conn: ConnectionManager,
    put_script: Script,
    ttl_secs: u64,
    max_batch_buckets: usize,
}

impl RedisDayBucketStore {
    pub fn new(conn: ConnectionManager, ttl_secs: u64, max_batch_buckets: usize) -> Self {
        Self {
            conn,
            put_script: Script::new(CONDITIONAL_MULTI_PUT),
            ttl_secs,
            max_batch_buckets,
        }
    }

    pub async fn connect(url: &str, ttl_secs: u64, max_batch_buckets: usize) -> TimelineResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, ttl_secs, max_batch_buckets))
    }

    pub fn bucket_key(user_id: &str, day: DayKey) -> String {
        format!("timeline:{{user:{}}}:day:{}", hash_tag_safe(user_id), day)
    }

    pub async fn ping(&self) -> TimelineResult<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                TimelineError::from(e)
            })?;
        Ok(())
    }
}

/// Percent-escapes braces so a user id can never close or reopen the hash tag.
fn hash_tag_safe(user_id: &str) -> Cow<'_, str> {
    if !user_id.contains(|c| matches!(c, '{' | '}' | '%')) {
        return Cow::Borrowed(user_id);
    }
    Cow::Owned(
        user_id
            .replace('%', "%25")
            .replace('{', "%7B")
            .replace('}', "%7D"),
    )
}

#[async_trait::async_trait]
impl DayBucketStore for RedisDayBucketStore {
    async fn get_many(
        &self,
        user_id: &str,
        days: &[DayKey],
    ) -> TimelineResult<HashMap<DayKey, DayBucket>> {
        if days.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for day in days {
            pipe.cmd("HMGET")
                .arg(Self::bucket_key(user_id, *day))
                .arg("version")
                .arg("doc");
        }

        let records: Vec<(Option<u64>, Option<String>)> = pipe
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, "Redis HMGET pipeline failed: {}", e);
                TimelineError::from(e)
            })?;

        let mut buckets = HashMap::with_capacity(days.len());
        for (day, record) in days.iter().zip(records) {
            if let (Some(version), Some(doc)) = record {
                buckets.insert(*day, decode_bucket(&doc, version)?);
            }
        }

        debug!(
            user_id = %user_id,
            requested = days.len(),
            found = buckets.len(),
            "Loaded day buckets"
        );
        Ok(buckets)
    }

    async fn put_many(&self, buckets: &[DayBucket]) -> TimelineResult<()> {
        let Some(first) = buckets.first() else {
            return Ok(());
        };

        if buckets.len() > self.max_batch_buckets {
            return Err(TimelineError::Internal(format!(
                "batch of {} buckets exceeds the limit of {}",
                buckets.len(),
                self.max_batch_buckets
            )));
        }
        if buckets.iter().any(|b| b.user_id != first.user_id) {
            return Err(TimelineError::Internal(
                "a bucket batch must belong to a single user".to_string(),
            ));
        }

        let docs = buckets
            .iter()
            .map(encode_bucket)
            .collect::<TimelineResult<Vec<_>>>()?;

        let mut invocation = self.put_script.prepare_invoke();
        for bucket in buckets {
            invocation.key(Self::bucket_key(&bucket.user_id, bucket.day));
        }
        for bucket in buckets {
            invocation.arg(bucket.version);
        }
        for doc in &docs {
            invocation.arg(doc);
        }
        invocation.arg(self.ttl_secs);

        let applied: i64 = invocation
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!(user_id = %first.user_id, "Redis bucket write failed: {}", e);
                TimelineError::from(e)
            })?;

        if applied == 0 {
            return Err(TimelineError::Conflict(format!(
                "day buckets of user {} changed concurrently",
                first.user_id
            )));
        }

        debug!(
            user_id = %first.user_id,
            buckets = buckets.len(),
            "Stored day buckets"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_keeps_user_in_one_slot() {
        let day = DayKey::from_ymd(2024, 1, 10).unwrap();
        assert_eq!(
            RedisDayBucketStore::bucket_key("u1", day),
            "timeline:{user:u1}:day:2024:1:10"
        );
    }

    #[test]
    fn test_braces_in_user_id_cannot_break_the_hash_tag() {
        let day = DayKey::from_ymd(2024, 1, 10).unwrap();
        let key = RedisDayBucketStore::bucket_key("a}b{c", day);

        assert_eq!(key, "timeline:{user:a%7Db%7Bc}:day:2024:1:10");
        assert_ne!(key, RedisDayBucketStore::bucket_key("a%7Db%7Bc", day));
    }
}
