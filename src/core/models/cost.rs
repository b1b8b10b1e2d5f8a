use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label used when the cost API returns a row without a resource group.
pub const NO_RESOURCE_GROUP_LABEL: &str = "No Resource Group Name";

/// Display label for the per-day total.
pub const TOTAL_DAILY_COST_LABEL: &str = "Total Daily Cost";

const USAGE_DATE_FORMAT: &str = "%Y%m%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateKeyError {
    #[error("Usage date '{0}' is not an 8-digit YYYYMMDD value")]
    Malformed(String),
    #[error("Usage date '{0}' is not a valid calendar day")]
    InvalidDay(String),
}

/// Compact `YYYYMMDD` date key as returned by the cost query API.
///
/// Kept as the raw digit string; for well-formed keys lexicographic order is
/// chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UsageDate(String);

impl UsageDate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[cfg(test)]
    pub fn from_naive_date(date: NaiveDate) -> Self {
        Self(date.format(USAGE_DATE_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the key into a calendar day.
    pub fn to_naive_date(&self) -> Result<NaiveDate, DateKeyError> {
        let raw = self.as_str();
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DateKeyError::Malformed(raw.to_string()));
        }
        NaiveDate::parse_from_str(raw, USAGE_DATE_FORMAT)
            .map_err(|_| DateKeyError::InvalidDay(raw.to_string()))
    }
}

impl fmt::Display for UsageDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCost {
    pub resource_group: String,
    pub cost: f64,
}

/// All resource-group costs recorded for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCosts<K> {
    pub date: K,
    pub groups: Vec<GroupCost>,
    /// Rounded sum of `groups`, set by the totalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl<K> DailyCosts<K> {
    pub fn new(date: K) -> Self {
        Self {
            date,
            groups: Vec::new(),
            total: None,
        }
    }

    /// Record a cost for a resource group. An existing entry keeps its
    /// position and takes the new cost.
    pub fn record(&mut self, resource_group: &str, cost: f64) {
        match self
            .groups
            .iter_mut()
            .find(|g| g.resource_group == resource_group)
        {
            Some(existing) => existing.cost = cost,
            None => self.groups.push(GroupCost {
                resource_group: resource_group.to_string(),
                cost,
            }),
        }
    }

    pub fn group_sum(&self) -> f64 {
        self.groups.iter().map(|g| g.cost).sum()
    }

    /// The first `n` groups in current order.
    pub fn top_groups(&self, n: usize) -> &[GroupCost] {
        &self.groups[..n.min(self.groups.len())]
    }

    pub fn total_or_zero(&self) -> f64 {
        self.total.unwrap_or(0.0)
    }
}

/// Date → resource group → cost, in the order set by the last pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTable<K> {
    pub days: Vec<DailyCosts<K>>,
}

impl<K> Default for CostTable<K> {
    fn default() -> Self {
        Self { days: Vec::new() }
    }
}

impl<K: PartialEq> CostTable<K> {
    pub fn record(&mut self, date: K, resource_group: &str, cost: f64) {
        let position = self.days.iter().position(|d| d.date == date);
        let day = match position {
            Some(i) => &mut self.days[i],
            None => {
                self.days.push(DailyCosts::new(date));
                let last = self.days.len() - 1;
                &mut self.days[last]
            }
        };
        day.record(resource_group, cost);
    }
}

impl<K> CostTable<K> {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn row_count(&self) -> usize {
        self.days.iter().map(|d| d.groups.len()).sum()
    }
}
