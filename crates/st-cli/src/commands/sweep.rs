//! Sweep command: applies retention now.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};

use st_engine::sweeper;
use st_store::{AggregateStore, KeyValueStore};

pub async fn run<W: Write, S: KeyValueStore>(
    writer: &mut W,
    store: &AggregateStore<S>,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let removed = sweeper::sweep(store, now, retention_days).await?;
    if removed.is_empty() {
        writeln!(writer, "No expired daily buckets.")?;
        return Ok(());
    }
    writeln!(writer, "Removed {} expired daily buckets:", removed.len())?;
    for date in removed {
        writeln!(writer, "- {date}")?;
    }
    Ok(())
}
