//! Persisted aggregates: lifetime totals and per-day buckets.
//!
//! Both aggregates are derived from the same stream of flushes. The wire
//! layout matches what the presentation layer reads:
//!
//! ```json
//! {
//!   "timeData": { "example.com": { "totalTime": 15, "lastVisit": 1700000000000, "favicon": "..." } },
//!   "dailyData": { "2024-11-14": { "example.com": 15 } }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Domain;

/// Storage key of the lifetime aggregate.
pub const TIME_DATA_KEY: &str = "timeData";

/// Storage key of the daily aggregate.
pub const DAILY_DATA_KEY: &str = "dailyData";

/// All-time accumulated seconds and metadata for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeRecord {
    /// Total attributed seconds. Never decreases except through a reset.
    #[serde(rename = "totalTime")]
    pub total_time_secs: u64,
    /// Instant of the most recent flush for this domain.
    #[serde(rename = "lastVisit", with = "chrono::serde::ts_milliseconds")]
    pub last_visit: DateTime<Utc>,
    /// Icon reference derived from the domain.
    #[serde(rename = "favicon")]
    pub icon_ref: String,
}

/// Seconds per domain for a single calendar date.
pub type DailyBucket = BTreeMap<Domain, u64>;

/// Lifetime records keyed by domain.
pub type TimeData = BTreeMap<Domain, LifetimeRecord>;

/// Daily buckets keyed by UTC calendar date.
pub type DailyData = BTreeMap<NaiveDate, DailyBucket>;

/// Snapshot of both persisted aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    #[serde(default)]
    pub time_data: TimeData,
    #[serde(default)]
    pub daily_data: DailyData,
}

/// Calendar date an instant belongs to. Dates are UTC throughout.
pub fn date_of(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

impl Aggregates {
    /// Adds `seconds` for `domain` at `now` to both aggregates.
    ///
    /// Creates the lifetime record (with `icon_ref`) and the day's bucket on
    /// first use. `last_visit` never moves backwards, so a late write of an
    /// older contribution keeps the newer visit.
    pub fn record(&mut self, domain: &Domain, seconds: u64, now: DateTime<Utc>, icon_template: &str) {
        let record = self
            .time_data
            .entry(domain.clone())
            .or_insert_with(|| LifetimeRecord {
                total_time_secs: 0,
                last_visit: now,
                icon_ref: domain.icon_ref(icon_template),
            });
        record.total_time_secs = record.total_time_secs.saturating_add(seconds);
        record.last_visit = record.last_visit.max(now);

        let entry = self
            .daily_data
            .entry(date_of(now))
            .or_default()
            .entry(domain.clone())
            .or_insert(0);
        *entry = entry.saturating_add(seconds);
    }

    /// Returns true when neither aggregate holds any data.
    pub fn is_empty(&self) -> bool {
        self.time_data.is_empty() && self.daily_data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TEMPLATE: &str = "https://icons.test/{domain}";

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn record_creates_lifetime_and_daily_entries() {
        let mut aggs = Aggregates::default();
        let domain = Domain::new("example.com").unwrap();

        aggs.record(&domain, 10, at(9, 0, 10), TEMPLATE);

        let record = &aggs.time_data[&domain];
        assert_eq!(record.total_time_secs, 10);
        assert_eq!(record.last_visit, at(9, 0, 10));
        assert_eq!(record.icon_ref, "https://icons.test/example.com");
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(aggs.daily_data[&day][&domain], 10);
    }

    #[test]
    fn record_accumulates_and_updates_last_visit() {
        let mut aggs = Aggregates::default();
        let domain = Domain::new("example.com").unwrap();

        aggs.record(&domain, 10, at(9, 0, 10), TEMPLATE);
        aggs.record(&domain, 5, at(9, 0, 15), TEMPLATE);

        let record = &aggs.time_data[&domain];
        assert_eq!(record.total_time_secs, 15);
        assert_eq!(record.last_visit, at(9, 0, 15));
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(aggs.daily_data[&day][&domain], 15);
    }

    #[test]
    fn older_contribution_keeps_newer_last_visit() {
        let mut aggs = Aggregates::default();
        let domain = Domain::new("example.com").unwrap();

        aggs.record(&domain, 5, at(9, 0, 30), TEMPLATE);
        aggs.record(&domain, 5, at(9, 0, 10), TEMPLATE);

        assert_eq!(aggs.time_data[&domain].last_visit, at(9, 0, 30));
        assert_eq!(aggs.time_data[&domain].total_time_secs, 10);
    }

    #[test]
    fn record_splits_days_but_not_lifetime() {
        let mut aggs = Aggregates::default();
        let domain = Domain::new("example.com").unwrap();
        let before_midnight = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 50).unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 5).unwrap();

        aggs.record(&domain, 8, before_midnight, TEMPLATE);
        aggs.record(&domain, 7, after_midnight, TEMPLATE);

        assert_eq!(aggs.time_data[&domain].total_time_secs, 15);
        assert_eq!(aggs.daily_data.len(), 2);
        let daily_sum: u64 = aggs.daily_data.values().filter_map(|b| b.get(&domain)).sum();
        assert_eq!(daily_sum, 15);
    }

    #[test]
    fn wire_format_uses_presentation_field_names() {
        let mut aggs = Aggregates::default();
        let domain = Domain::new("example.com").unwrap();
        aggs.record(&domain, 3, Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(), TEMPLATE);

        let json = serde_json::to_value(&aggs).unwrap();
        assert_eq!(json["timeData"]["example.com"]["totalTime"], 3);
        assert_eq!(json["timeData"]["example.com"]["lastVisit"], 1_700_000_000_000_i64);
        assert_eq!(
            json["timeData"]["example.com"]["favicon"],
            "https://icons.test/example.com"
        );
        assert_eq!(json["dailyData"]["2023-11-14"]["example.com"], 3);
    }

    #[test]
    fn missing_sections_deserialize_empty() {
        let aggs: Aggregates = serde_json::from_str("{}").unwrap();
        assert!(aggs.is_empty());
    }
}
