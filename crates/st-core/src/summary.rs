//! Read-only aggregation over persisted data for presentation and export.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregates, DailyBucket, date_of};
use crate::types::Domain;

/// Number of calendar days in the trailing week, today inclusive.
pub const WEEK_DAYS: u64 = 7;

/// Headline totals over the persisted aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Seconds recorded in today's bucket.
    pub today_total: u64,
    /// Seconds recorded over the trailing seven dates, today inclusive.
    pub week_total: u64,
    /// Sum of every lifetime record.
    pub all_time_total: u64,
    /// Number of lifetime records.
    pub domain_count: usize,
}

/// Dates of the trailing week ending at `today`, newest first.
pub fn week_dates(today: NaiveDate) -> Vec<NaiveDate> {
    (0..WEEK_DAYS)
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .collect()
}

fn bucket_total(bucket: Option<&DailyBucket>) -> u64 {
    bucket.map_or(0, |b| b.values().sum())
}

/// Computes headline totals as of `now`.
pub fn summarize(aggregates: &Aggregates, now: DateTime<Utc>) -> Summary {
    let today = date_of(now);
    let today_total = bucket_total(aggregates.daily_data.get(&today));
    let week_total = week_dates(today)
        .iter()
        .map(|date| bucket_total(aggregates.daily_data.get(date)))
        .sum();
    let all_time_total = aggregates
        .time_data
        .values()
        .map(|record| record.total_time_secs)
        .sum();

    Summary {
        today_total,
        week_total,
        all_time_total,
        domain_count: aggregates.time_data.len(),
    }
}

/// Time window for per-domain views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    #[default]
    All,
}

impl Period {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::All => "all",
        }
    }

    /// Dates covered by this period, or `None` for the lifetime view.
    pub fn dates(self, today: NaiveDate) -> Option<Vec<NaiveDate>> {
        match self {
            Self::Today => Some(vec![today]),
            Self::Week => Some(week_dates(today)),
            Self::All => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "all" => Ok(Self::All),
            _ => Err(format!("invalid period: {s}")),
        }
    }
}

/// Time spent on one domain within a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainUsage {
    pub domain: Domain,
    pub total_time: u64,
    pub favicon: String,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_visit: Option<DateTime<Utc>>,
    /// Share of the period's total, in percent.
    pub percentage: f64,
}

/// Per-domain usage for `period`, sorted by time descending then by domain.
///
/// The lifetime view reads lifetime records; dated views merge the period's
/// buckets and take icon and last visit from the lifetime record when one
/// exists, falling back to `icon_template`.
#[expect(
    clippy::cast_precision_loss,
    reason = "percentages only need display precision"
)]
pub fn period_usage(
    aggregates: &Aggregates,
    period: Period,
    today: NaiveDate,
    icon_template: &str,
) -> Vec<DomainUsage> {
    let totals: BTreeMap<Domain, u64> = match period.dates(today) {
        None => aggregates
            .time_data
            .iter()
            .map(|(domain, record)| (domain.clone(), record.total_time_secs))
            .collect(),
        Some(dates) => {
            let mut totals = BTreeMap::new();
            for bucket in dates.iter().filter_map(|d| aggregates.daily_data.get(d)) {
                for (domain, secs) in bucket {
                    *totals.entry(domain.clone()).or_insert(0) += secs;
                }
            }
            totals
        }
    };

    let grand_total: u64 = totals.values().sum();
    let mut usage: Vec<DomainUsage> = totals
        .into_iter()
        .map(|(domain, total_time)| {
            let record = aggregates.time_data.get(&domain);
            let percentage = if grand_total == 0 {
                0.0
            } else {
                total_time as f64 / grand_total as f64 * 100.0
            };
            DomainUsage {
                favicon: record.map_or_else(|| domain.icon_ref(icon_template), |r| r.icon_ref.clone()),
                last_visit: record.map(|r| r.last_visit),
                domain,
                total_time,
                percentage,
            }
        })
        .collect();

    usage.sort_by(|a, b| b.total_time.cmp(&a.total_time).then_with(|| a.domain.cmp(&b.domain)));
    usage
}

/// Formats seconds as `45s`, `12m`, `2h` or `2h 5m`.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {minutes}m")
        }
    }
}
