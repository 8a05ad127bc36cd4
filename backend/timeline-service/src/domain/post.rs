use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DayKey;

/// One typed block of post content. A block is either text or a link, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Url { url: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ContentBlock::Url { url: url.into() }
    }
}

/// Post snapshot as owned by the post service; this service only caches copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub contents: Vec<ContentBlock>,
    pub author_id: String,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Calendar day (UTC) of publication, which selects the post's day bucket.
    pub fn day_key(&self) -> DayKey {
        DayKey::from_datetime(self.published_at)
    }

    /// Last-writer-wins: true when this snapshot should replace `other`.
    pub fn supersedes(&self, other: &Post) -> bool {
        self.updated_at > other.updated_at
    }
}
