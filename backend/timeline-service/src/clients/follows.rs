use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::error::{TimelineError, TimelineResult};
use crate::repository::FollowerGateway;

#[derive(Debug, Deserialize)]
struct FollowersResponse {
    #[serde(default)]
    followers: Vec<String>,
}

/// REST client for the follow service
pub struct HttpFollowerGateway {
    client: Client,
    base_url: String,
}

impl HttpFollowerGateway {
    pub fn new(base_url: &str, timeout: Duration) -> TimelineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimelineError::Config(format!("follow service client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl FollowerGateway for HttpFollowerGateway {
    async fn get_follower_ids(&self, user_id: &str) -> TimelineResult<Vec<String>> {
        let url = format!("{}/api/v1/follow/user/{}/followers", self.base_url, user_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TimelineError::Gateway(format!("follow service request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(user_id = %user_id, %status, "Follower lookup failed");
            return Err(TimelineError::Gateway(format!(
                "follow service returned {} for user {}",
                status, user_id
            )));
        }

        let body: FollowersResponse = response
            .json()
            .await
            .map_err(|e| TimelineError::Gateway(format!("followers parse failed: {}", e)))?;
        Ok(body.followers)
    }
}
