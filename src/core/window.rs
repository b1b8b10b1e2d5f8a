use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// Inclusive range of days sent to the cost query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryWindow {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl QueryWindow {
    /// Window from `start_days_ago` to `end_days_ago` days before `today`.
    pub fn trailing(today: NaiveDate, start_days_ago: u32, end_days_ago: u32) -> Self {
        Self {
            first_day: today - Duration::days(i64::from(start_days_ago)),
            last_day: today - Duration::days(i64::from(end_days_ago)),
        }
    }

    /// Start of the first day, e.g. "2024-01-01T00:00:00Z".
    pub fn from_timestamp(&self) -> String {
        self.first_day.format("%Y-%m-%dT00:00:00Z").to_string()
    }

    /// End of the last day, e.g. "2024-01-03T23:59:59Z".
    pub fn to_timestamp(&self) -> String {
        self.last_day.format("%Y-%m-%dT23:59:59Z").to_string()
    }

    pub fn describe(&self) -> String {
        format!("{} to {}", self.first_day, self.last_day)
    }
}
