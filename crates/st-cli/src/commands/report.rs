//! Report command: headline totals and top domains for a period.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use st_core::{DomainUsage, Period, Summary, format_duration};
use st_engine::Facade;
use st_store::{AggregateStore, KeyValueStore};

/// Number of domains listed in a report.
pub const TOP_DOMAINS: usize = 20;

/// Computed report data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub period: Period,
    pub summary: Summary,
    pub domains: Vec<DomainUsage>,
}

/// Gathers the summary and the top domains of `period` as of `now`.
pub async fn gather<S: KeyValueStore>(
    store: Arc<AggregateStore<S>>,
    icon_template: &str,
    period: Period,
    now: DateTime<Utc>,
) -> Result<ReportData> {
    let facade = Facade::new(store, icon_template.to_string());
    let summary = facade.summarize(now).await?;
    let mut domains = facade.usage(period, now).await?;
    domains.truncate(TOP_DOMAINS);
    Ok(ReportData {
        period,
        summary,
        domains,
    })
}

/// Writes the report as text.
pub fn format_report<W: Write>(writer: &mut W, report: &ReportData) -> Result<()> {
    let summary = &report.summary;
    writeln!(writer, "Screen time ({})", report.period)?;
    writeln!(writer, "{:<12}{}", "Today:", format_duration(summary.today_total))?;
    writeln!(writer, "{:<12}{}", "This week:", format_duration(summary.week_total))?;
    writeln!(writer, "{:<12}{}", "All time:", format_duration(summary.all_time_total))?;
    writeln!(writer, "{:<12}{}", "Domains:", summary.domain_count)?;
    writeln!(writer)?;

    if report.domains.is_empty() {
        writeln!(writer, "No time recorded.")?;
        return Ok(());
    }

    let width = report
        .domains
        .iter()
        .map(|usage| usage.domain.as_str().len())
        .max()
        .unwrap_or(0);
    for usage in &report.domains {
        writeln!(
            writer,
            "{:<width$}  {:>7}  {:>5.1}%",
            usage.domain.as_str(),
            format_duration(usage.total_time),
            usage.percentage,
        )?;
    }
    Ok(())
}

pub async fn run<W: Write, S: KeyValueStore>(
    writer: &mut W,
    store: Arc<AggregateStore<S>>,
    icon_template: &str,
    period: Period,
    json: bool,
) -> Result<()> {
    let report = gather(store, icon_template, period, Utc::now()).await?;
    if json {
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
    } else {
        format_report(writer, &report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use insta::assert_snapshot;
    use st_core::Domain;
    use st_store::MemoryStore;

    const TEMPLATE: &str = "https://icons.test/{domain}";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    async fn seeded() -> Arc<AggregateStore<MemoryStore>> {
        let store = Arc::new(AggregateStore::new(MemoryStore::new()));
        for (domain, secs, days_ago) in [("github.com", 3720, 0), ("docs.rs", 600, 3), ("example.com", 45, 9)] {
            let domain = Domain::new(domain).unwrap();
            let at = now() - Duration::days(days_ago);
            store
                .update(|aggs| aggs.record(&domain, secs, at, TEMPLATE))
                .await
                .unwrap();
        }
        store
    }

    async fn render(period: Period) -> String {
        let report = gather(seeded().await, TEMPLATE, period, now()).await.unwrap();
        let mut output = Vec::new();
        format_report(&mut output, &report).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn all_time_report() {
        assert_snapshot!(render(Period::All).await, @r"
        Screen time (all)
        Today:      1h 2m
        This week:  1h 12m
        All time:   1h 12m
        Domains:    3

        github.com     1h 2m   85.2%
        docs.rs          10m   13.7%
        example.com      45s    1.0%
        ");
    }

    #[tokio::test]
    async fn today_report_lists_only_todays_domains() {
        assert_snapshot!(render(Period::Today).await, @r"
        Screen time (today)
        Today:      1h 2m
        This week:  1h 12m
        All time:   1h 12m
        Domains:    3

        github.com    1h 2m  100.0%
        ");
    }

    #[tokio::test]
    async fn empty_report() {
        let store = Arc::new(AggregateStore::new(MemoryStore::new()));
        let report = gather(store, TEMPLATE, Period::Week, now()).await.unwrap();
        let mut output = Vec::new();
        format_report(&mut output, &report).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Screen time (week)
        Today:      0s
        This week:  0s
        All time:   0s
        Domains:    0

        No time recorded.
        ");
    }

    #[tokio::test]
    async fn json_report_shape() {
        let report = gather(seeded().await, TEMPLATE, Period::Week, now()).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["period"], "week");
        assert_eq!(json["summary"]["weekTotal"], 4320);
        assert_eq!(json["domains"].as_array().unwrap().len(), 2);
        assert_eq!(json["domains"][0]["domain"], "github.com");
        assert_eq!(json["domains"][0]["favicon"], "https://icons.test/github.com");
    }
}
