//! Storage encoding of cached post snapshots.
//!
//! Each post is stored as base64(gzip(json)) so a single entry can be decoded
//! without touching the rest of its bucket. A bucket document is plain JSON
//! listing those encoded entries.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::domain::{DayBucket, DayKey, Post};
use crate::error::{TimelineError, TimelineResult};

/// Persisted shape of a day bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDayBucket {
    pub user_id: String,
    pub date: DayKey,
    pub posts: Vec<String>,
    pub last_update: DateTime<Utc>,
}

pub fn encode_post(post: &Post) -> TimelineResult<String> {
    let json = serde_json::to_vec(post)
        .map_err(|e| TimelineError::Encoding(format!("serialize post {}: {}", post.id, e)))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| TimelineError::Encoding(format!("compress post {}: {}", post.id, e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| TimelineError::Encoding(format!("compress post {}: {}", post.id, e)))?;

    Ok(STANDARD.encode(compressed))
}

pub fn decode_post(encoded: &str) -> TimelineResult<Post> {
    let compressed = STANDARD
        .decode(encoded)
        .map_err(|e| TimelineError::Encoding(format!("base64: {}", e)))?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| TimelineError::Encoding(format!("gunzip: {}", e)))?;

    serde_json::from_slice(&json).map_err(|e| TimelineError::Encoding(format!("json: {}", e)))
}

pub fn encode_bucket(bucket: &DayBucket) -> TimelineResult<String> {
    let posts = bucket
        .posts
        .iter()
        .map(encode_post)
        .collect::<TimelineResult<Vec<_>>>()?;

    let stored = StoredDayBucket {
        user_id: bucket.user_id.clone(),
        date: bucket.day,
        posts,
        last_update: bucket.last_update,
    };

    serde_json::to_string(&stored).map_err(|e| TimelineError::Encoding(format!("bucket: {}", e)))
}

pub fn decode_bucket(doc: &str, version: u64) -> TimelineResult<DayBucket> {
    let stored: StoredDayBucket = serde_json::from_str(doc)
        .map_err(|e| TimelineError::Encoding(format!("bucket: {}", e)))?;

    let posts = stored
        .posts
        .iter()
        .map(|entry| decode_post(entry))
        .collect::<TimelineResult<Vec<_>>>()?;

    Ok(DayBucket {
        user_id: stored.user_id,
        day: stored.date,
        posts,
        last_update: stored.last_update,
        version,
    })
}
