//! Retention rule for daily buckets.

use chrono::{Days, NaiveDate};

use crate::aggregate::DailyData;

/// Last date that is already outside the retention window.
///
/// A bucket dated on or before the cutoff is expired. With a 30-day window and
/// `today = 2025-03-31`, the cutoff is `2025-03-01`.
pub fn cutoff(today: NaiveDate, retention_days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(retention_days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Removes every bucket older than the retention window.
///
/// Returns the removed dates in ascending order. Running it again with the same
/// `today` removes nothing.
pub fn purge_expired(daily: &mut DailyData, today: NaiveDate, retention_days: u32) -> Vec<NaiveDate> {
    let cutoff = cutoff(today, retention_days);
    let expired: Vec<NaiveDate> = daily.range(..=cutoff).map(|(date, _)| *date).collect();
    for date in &expired {
        daily.remove(date);
    }
    expired
}
