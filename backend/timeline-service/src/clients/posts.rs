//! REST client for the post service.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{ContentBlock, Post};
use crate::error::{TimelineError, TimelineResult};
use crate::repository::PostGateway;

/// Content block as sent by the post service: a `type` tag plus optional fields.
#[derive(Debug, Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    url: Option<String>,
}

impl TryFrom<WireContentBlock> for ContentBlock {
    type Error = TimelineError;

    fn try_from(block: WireContentBlock) -> Result<Self, Self::Error> {
        match (block.text, block.url) {
            (Some(text), None) => Ok(ContentBlock::Text { text }),
            (None, Some(url)) => Ok(ContentBlock::Url { url }),
            (Some(_), Some(_)) => Err(TimelineError::Gateway(format!(
                "content block of type '{}' carries both text and url",
                block.kind
            ))),
            (None, None) => Err(TimelineError::Gateway(format!(
                "content block of type '{}' carries neither text nor url",
                block.kind
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePost {
    id: String,
    #[serde(default)]
    contents: Vec<WireContentBlock>,
    author_id: String,
    published_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WirePost> for Post {
    type Error = TimelineError;

    fn try_from(post: WirePost) -> Result<Self, Self::Error> {
        let contents = post
            .contents
            .into_iter()
            .map(ContentBlock::try_from)
            .collect::<TimelineResult<Vec<_>>>()?;

        Ok(Post {
            id: post.id,
            contents,
            author_id: post.author_id,
            published_at: post.published_at,
            updated_at: post.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<WirePost>,
}

pub struct HttpPostGateway {
    client: Client,
    base_url: String,
}

impl HttpPostGateway {
    pub fn new(base_url: &str, timeout: Duration) -> TimelineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimelineError::Config(format!("post service client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PostGateway for HttpPostGateway {
    async fn get_post(&self, post_id: &str) -> TimelineResult<Post> {
        let url = format!("{}/api/v1/posts/{}", self.base_url, post_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TimelineError::Gateway(format!("post service request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(TimelineError::PostNotFound(post_id.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            warn!(post_id = %post_id, %status, "Post service returned an error");
            return Err(TimelineError::Gateway(format!(
                "post service returned {} for post {}",
                status, post_id
            )));
        }

        let post: WirePost = response
            .json()
            .await
            .map_err(|e| TimelineError::Gateway(format!("post parse failed: {}", e)))?;
        post.try_into()
    }

    async fn mget_posts(&self, post_ids: &[String]) -> TimelineResult<Vec<Post>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/v1/posts", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", post_ids.join(","))])
            .send()
            .await
            .map_err(|e| TimelineError::Gateway(format!("post service request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(count = post_ids.len(), %status, "Post service batch lookup failed");
            return Err(TimelineError::Gateway(format!(
                "post service returned {} for batch lookup",
                status
            )));
        }

        let body: PostsResponse = response
            .json()
            .await
            .map_err(|e| TimelineError::Gateway(format!("posts parse failed: {}", e)))?;

        debug!(
            requested = post_ids.len(),
            returned = body.posts.len(),
            "Hydrated posts"
        );

        body.posts.into_iter().map(Post::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_block_requires_exactly_one_field() {
        let both = WireContentBlock {
            kind: "text".into(),
            text: Some("a".into()),
            url: Some("b".into()),
        };
        assert!(ContentBlock::try_from(both).is_err());

        let neither = WireContentBlock {
            kind: "text".into(),
            text: None,
            url: None,
        };
        assert!(ContentBlock::try_from(neither).is_err());

        let url = WireContentBlock {
            kind: "url".into(),
            text: None,
            url: Some("https://nova.dev".into()),
        };
        assert_eq!(
            ContentBlock::try_from(url).unwrap(),
            ContentBlock::url("https://nova.dev")
        );
    }
}
