//! Reset command: deletes all recorded data.

use std::io::Write;

use anyhow::{Result, bail};

use st_store::{AggregateStore, KeyValueStore};

pub async fn run<W: Write, S: KeyValueStore>(writer: &mut W, store: &AggregateStore<S>, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to delete all time data without --yes");
    }
    store.reset().await?;
    tracing::info!("all time data reset");
    writeln!(writer, "All time data has been reset.")?;
    Ok(())
}
