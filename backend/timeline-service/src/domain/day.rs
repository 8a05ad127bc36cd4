use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TimelineError, TimelineResult};

/// A UTC calendar day, the partition unit of the timeline cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.date_naive())
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// 00:00:00 of this day.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_time(NaiveTime::MIN))
    }

    /// Last representable instant of this day.
    pub fn end(&self) -> DateTime<Utc> {
        self.start() + Duration::days(1) - Duration::nanoseconds(1)
    }

    pub fn next(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

/// Rendered as `year:month:day` without padding, e.g. `2024:1:10`.
impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use chrono::Datelike;
        write!(f, "{}:{}:{}", self.0.year(), self.0.month(), self.0.day())
    }
}

/// Inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub from: DayKey,
    pub to: DayKey,
}

impl DayRange {
    pub fn new(from: DayKey, to: DayKey) -> TimelineResult<Self> {
        if from > to {
            return Err(TimelineError::Validation(format!(
                "from date {} is after to date {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    pub fn len_days(&self) -> i64 {
        (self.to.date() - self.from.date()).num_days() + 1
    }

    pub fn days(&self) -> Vec<DayKey> {
        let mut days = Vec::with_capacity(self.len_days() as usize);
        let mut current = Some(self.from);
        while let Some(day) = current {
            if day > self.to {
                break;
            }
            days.push(day);
            current = day.next();
        }
        days
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.from.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.to.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posts_around_midnight_land_in_distinct_days() {
        let before = Utc.with_ymd_and_hms(2024, 1, 10, 23, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 11, 0, 1, 0).unwrap();

        let a = DayKey::from_datetime(before);
        let b = DayKey::from_datetime(after);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "2024:1:10");
        assert_eq!(b.to_string(), "2024:1:11");
    }

    #[test]
    fn test_day_bounds() {
        let day = DayKey::from_ymd(2024, 2, 29).unwrap();
        assert_eq!(day.start(), Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
        assert!(day.end() < Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(DayKey::from_datetime(day.end()), day);
    }

    #[test]
    fn test_range_days_inclusive_across_month() {
        let range = DayRange::new(
            DayKey::from_ymd(2024, 1, 30).unwrap(),
            DayKey::from_ymd(2024, 2, 2).unwrap(),
        )
        .unwrap();
        let days: Vec<String> = range.days().iter().map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2024:1:30", "2024:1:31", "2024:2:1", "2024:2:2"]);
        assert_eq!(range.len_days(), 4);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = DayRange::new(
            DayKey::from_ymd(2024, 2, 2).unwrap(),
            DayKey::from_ymd(2024, 2, 1).unwrap(),
        );
        assert!(matches!(result, Err(TimelineError::Validation(_))));
    }

    #[test]
    fn test_invalid_calendar_date() {
        assert!(DayKey::from_ymd(2023, 2, 29).is_none());
        assert!(DayKey::from_ymd(2024, 13, 1).is_none());
    }
}
