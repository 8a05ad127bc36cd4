use actix_web::{delete, get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{ContentBlock, DayTimelineQuery, Post, TimelineFilled};
use crate::error::{TimelineError, TimelineResult};
use crate::services::TimelineFillService;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
    pub url: Option<String>,
}

impl From<ContentBlock> for ContentResponse {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::Text { text } => Self {
                kind: "text".to_string(),
                text: Some(text),
                url: None,
            },
            ContentBlock::Url { url } => Self {
                kind: "url".to_string(),
                text: None,
                url: Some(url),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: String,
    pub contents: Vec<ContentResponse>,
    pub author_id: String,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            contents: post.contents.into_iter().map(Into::into).collect(),
            author_id: post.author_id,
            published_at: post.published_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub last_update: DateTime<Utc>,
    pub posts: Vec<PostResponse>,
    pub user_id: String,
}

impl From<TimelineFilled> for TimelineResponse {
    fn from(timeline: TimelineFilled) -> Self {
        Self {
            last_update: timeline.last_update,
            posts: timeline.posts.into_iter().map(Into::into).collect(),
            user_id: timeline.user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPostRequest {
    pub user_id: String,
    pub post_id: String,
}

fn require_id(field: &str, value: &str) -> TimelineResult<()> {
    if value.trim().is_empty() {
        return Err(TimelineError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Day-range read; every date field is mandatory
#[get("/api/v1/user_timeline/{user_id}")]
pub async fn get_day_timeline(
    service: web::Data<Arc<TimelineFillService>>,
    path: web::Path<String>,
    query: web::Query<DayTimelineQuery>,
) -> TimelineResult<HttpResponse> {
    let user_id = path.into_inner();
    require_id("user_id", &user_id)?;
    debug!(user_id = %user_id, query = ?query, "Day timeline request");

    let timeline = service
        .get_day_user_timeline_filled(&user_id, &query)
        .await?;
    Ok(HttpResponse::Ok().json(TimelineResponse::from(timeline)))
}

#[get("/api/v1/user_timeline/{user_id}/all")]
pub async fn get_full_timeline(
    service: web::Data<Arc<TimelineFillService>>,
    path: web::Path<String>,
) -> TimelineResult<HttpResponse> {
    let user_id = path.into_inner();
    require_id("user_id", &user_id)?;

    let timeline = service.get_user_timeline(&user_id).await?;
    Ok(HttpResponse::Ok().json(TimelineResponse::from(timeline)))
}

#[post("/api/v1/user_timeline/add")]
pub async fn add_post(
    service: web::Data<Arc<TimelineFillService>>,
    body: web::Json<AddPostRequest>,
) -> TimelineResult<HttpResponse> {
    require_id("user_id", &body.user_id)?;
    require_id("post_id", &body.post_id)?;

    service.add_post(&body.post_id, &body.user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/api/v1/user_timeline/{user_id}/posts/{post_id}")]
pub async fn remove_post(
    service: web::Data<Arc<TimelineFillService>>,
    path: web::Path<(String, String)>,
) -> TimelineResult<HttpResponse> {
    let (user_id, post_id) = path.into_inner();

    service.remove_post(&post_id, &user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
