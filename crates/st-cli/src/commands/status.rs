//! Status command for showing what the database holds.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use st_core::{format_duration, summarize};
use st_store::{AggregateStore, KeyValueStore};

pub async fn run<W: Write, S: KeyValueStore>(
    writer: &mut W,
    store: &AggregateStore<S>,
    database_path: &Path,
    now: DateTime<Utc>,
) -> Result<()> {
    let aggregates = store.snapshot().await?;

    writeln!(writer, "Screen time tracker status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    if aggregates.is_empty() {
        writeln!(writer, "No time recorded.")?;
        return Ok(());
    }

    let summary = summarize(&aggregates, now);
    writeln!(writer, "Domains: {}", summary.domain_count)?;
    let dates = &aggregates.daily_data;
    match (dates.keys().next(), dates.keys().next_back()) {
        (Some(oldest), Some(newest)) => {
            writeln!(writer, "Tracked days: {} ({oldest} to {newest})", dates.len())?;
        }
        _ => writeln!(writer, "Tracked days: 0")?,
    }
    writeln!(writer, "Today: {}", format_duration(summary.today_total))?;
    writeln!(writer, "All time: {}", format_duration(summary.all_time_total))?;

    Ok(())
}
