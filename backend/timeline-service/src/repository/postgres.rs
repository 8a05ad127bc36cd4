use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::TimelineRepository;
use crate::domain::{TimelineReference, UserTimeline};
use crate::error::TimelineResult;

#[derive(sqlx::FromRow)]
struct ReferenceRow {
    user_id: String,
    post_id: String,
    published_at: DateTime<Utc>,
}

impl From<ReferenceRow> for TimelineReference {
    fn from(row: ReferenceRow) -> Self {
        TimelineReference {
            user_id: row.user_id,
            post_id: row.post_id,
            published_at: row.published_at,
        }
    }
}

/// PostgreSQL store for timeline references (source of truth)
#[derive(Clone)]
pub struct PostgresTimelineRepository {
    pool: PgPool,
}

impl PostgresTimelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn health_check(&self) -> TimelineResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TimelineRepository for PostgresTimelineRepository {
    async fn get_reference(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> TimelineResult<Option<TimelineReference>> {
        let row: Option<ReferenceRow> = sqlx::query_as(
            r#"
            SELECT user_id, post_id, published_at
            FROM timelines
            WHERE user_id = $1 AND post_id = $2
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn add_reference(&self, reference: &TimelineReference) -> TimelineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_timelines (user_id, created_at)
            VALUES ($1, NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(&reference.user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO timelines (user_id, post_id, published_at, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(&reference.user_id)
        .bind(&reference.post_id)
        .bind(reference.published_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            user_id = %reference.user_id,
            post_id = %reference.post_id,
            inserted = result.rows_affected() > 0,
            "Stored timeline reference"
        );
        Ok(())
    }

    async fn remove_reference(&self, user_id: &str, post_id: &str) -> TimelineResult<()> {
        let result = sqlx::query("DELETE FROM timelines WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        debug!(
            user_id = %user_id,
            post_id = %post_id,
            removed = result.rows_affected(),
            "Removed timeline reference"
        );
        Ok(())
    }

    async fn get_references(
        &self,
        user_id: &str,
        limit: i64,
    ) -> TimelineResult<Vec<TimelineReference>> {
        let rows: Vec<ReferenceRow> = sqlx::query_as(
            r#"
            SELECT user_id, post_id, published_at
            FROM timelines
            WHERE user_id = $1
            ORDER BY published_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_references_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> TimelineResult<Vec<TimelineReference>> {
        let rows: Vec<ReferenceRow> = sqlx::query_as(
            r#"
            SELECT user_id, post_id, published_at
            FROM timelines
            WHERE user_id = $1 AND published_at BETWEEN $2 AND $3
            ORDER BY published_at DESC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_user_timeline(&self, user_id: &str) -> TimelineResult<Option<UserTimeline>> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT user_id, created_at FROM user_timelines WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(user_id, created_at)| UserTimeline {
            user_id,
            created_at,
        }))
    }

    async fn create_user_timeline(&self, user_id: &str) -> TimelineResult<UserTimeline> {
        // DO UPDATE so RETURNING yields the existing row as well
        let (user_id, created_at): (String, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO user_timelines (user_id, created_at)
            VALUES ($1, NOW())
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING user_id, created_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserTimeline {
            user_id,
            created_at,
        })
    }
}
