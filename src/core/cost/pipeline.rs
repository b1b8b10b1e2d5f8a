use chrono::NaiveDate;

use crate::core::formatter::round_cents;
use crate::core::models::cost::{CostTable, DailyCosts, DateKeyError, UsageDate};

/// Order dates ascending and each day's groups by cost, highest first.
///
/// Both sorts are stable: groups with equal cost keep their prior order.
pub fn rank<K: Ord>(table: &mut CostTable<K>) {
    table.days.sort_by(|a, b| a.date.cmp(&b.date));
    for day in &mut table.days {
        day.groups.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    }
}

/// Replace raw `YYYYMMDD` keys with calendar days, keeping order.
pub fn normalize_dates(table: CostTable<UsageDate>) -> Result<CostTable<NaiveDate>, DateKeyError> {
    let days = table
        .days
        .into_iter()
        .map(|day| -> Result<DailyCosts<NaiveDate>, DateKeyError> {
            Ok(DailyCosts {
                date: day.date.to_naive_date()?,
                groups: day.groups,
                total: day.total,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CostTable { days })
}

/// Set each day's total to the sum of its groups, rounded to cents.
pub fn add_totals<K>(table: &mut CostTable<K>) {
    for day in &mut table.days {
        day.total = Some(round_cents(day.group_sum()));
    }
}

/// rank → normalize → total.
pub fn build_report(mut table: CostTable<UsageDate>) -> Result<CostTable<NaiveDate>, DateKeyError> {
    rank(&mut table);
    let mut report = normalize_dates(table)?;
    add_totals(&mut report);
    Ok(report)
}
