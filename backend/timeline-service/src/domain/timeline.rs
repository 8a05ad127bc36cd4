use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DayKey, DayRange, Post};
use crate::error::{TimelineError, TimelineResult};

/// Durable record that `post_id` belongs to `user_id`'s timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineReference {
    pub user_id: String,
    pub post_id: String,
    pub published_at: DateTime<Utc>,
}

/// Timeline header row. Its presence marks that the user's timeline was initialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTimeline {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Hydrated timeline returned by reads, newest post first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineFilled {
    pub user_id: String,
    pub posts: Vec<Post>,
    pub last_update: DateTime<Utc>,
}

impl TimelineFilled {
    pub fn new(user_id: impl Into<String>, mut posts: Vec<Post>, last_update: DateTime<Utc>) -> Self {
        sort_newest_first(&mut posts);
        Self {
            user_id: user_id.into(),
            posts,
            last_update,
        }
    }

    pub fn empty(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Vec::new(), Utc::now())
    }
}

pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Day-range filter as received from callers. Zero or missing fields are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTimelineQuery {
    pub from_day: Option<u32>,
    pub from_month: Option<u32>,
    pub from_year: Option<i32>,
    pub to_day: Option<u32>,
    pub to_month: Option<u32>,
    pub to_year: Option<i32>,
}

impl DayTimelineQuery {
    pub fn new(from: (i32, u32, u32), to: (i32, u32, u32)) -> Self {
        Self {
            from_year: Some(from.0),
            from_month: Some(from.1),
            from_day: Some(from.2),
            to_year: Some(to.0),
            to_month: Some(to.1),
            to_day: Some(to.2),
        }
    }

    /// Validates the filter and resolves it to an inclusive day range.
    pub fn to_range(&self, max_range_days: i64) -> TimelineResult<DayRange> {
        let from = resolve_day("from", self.from_year, self.from_month, self.from_day)?;
        let to = resolve_day("to", self.to_year, self.to_month, self.to_day)?;
        let range = DayRange::new(from, to)?;

        if range.len_days() > max_range_days {
            return Err(TimelineError::Validation(format!(
                "date range spans {} days, maximum is {}",
                range.len_days(),
                max_range_days
            )));
        }

        Ok(range)
    }
}

fn resolve_day(
    side: &str,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
) -> TimelineResult<DayKey> {
    let year = year.filter(|v| *v != 0);
    let month = month.filter(|v| *v != 0);
    let day = day.filter(|v| *v != 0);

    match (year, month, day) {
        (Some(y), Some(m), Some(d)) => DayKey::from_ymd(y, m, d).ok_or_else(|| {
            TimelineError::Validation(format!("{} date {}-{}-{} is not a valid date", side, y, m, d))
        }),
        _ => Err(TimelineError::Validation(format!(
            "{}_day, {}_month and {}_year are required",
            side, side, side
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str, hour: u32) -> Post {
        let at = Utc.with_ymd_and_hms(2024, 1, 10, hour, 0, 0).unwrap();
        Post {
            id: id.into(),
            contents: vec![],
            author_id: "a1".into(),
            published_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_filled_sorted_newest_first() {
        let filled = TimelineFilled::new("u1", vec![post("p1", 8), post("p3", 20), post("p2", 12)], Utc::now());
        let ids: Vec<&str> = filled.posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2", "p1"]);
    }

    #[test]
    fn test_query_requires_every_field() {
        let mut query = DayTimelineQuery::new((2024, 1, 1), (2024, 1, 3));
        query.to_month = None;
        assert!(matches!(query.to_range(31), Err(TimelineError::Validation(_))));

        let mut query = DayTimelineQuery::new((2024, 1, 1), (2024, 1, 3));
        query.from_day = Some(0);
        assert!(matches!(query.to_range(31), Err(TimelineError::Validation(_))));
    }

    #[test]
    fn test_query_rejects_invalid_dates_and_long_ranges() {
        let query = DayTimelineQuery::new((2024, 2, 30), (2024, 3, 1));
        assert!(query.to_range(31).is_err());

        let query = DayTimelineQuery::new((2024, 1, 1), (2024, 3, 1));
        assert!(query.to_range(31).is_err());

        let query = DayTimelineQuery::new((2024, 1, 1), (2024, 1, 31));
        assert_eq!(query.to_range(31).unwrap().len_days(), 31);
    }
}
