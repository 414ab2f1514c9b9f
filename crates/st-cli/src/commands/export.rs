//! Export command: writes both aggregates plus a summary as JSON.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use st_engine::{Facade, export_file_name};
use st_store::{AggregateStore, KeyValueStore};

/// Resolves the export destination. A directory gets the default file name.
pub fn destination(output: &Path, now: DateTime<Utc>) -> PathBuf {
    if output.is_dir() {
        output.join(export_file_name(now))
    } else {
        output.to_path_buf()
    }
}

/// Exports to `output`, or to `writer` when no output is given.
pub async fn run<W: Write, S: KeyValueStore>(
    writer: &mut W,
    store: Arc<AggregateStore<S>>,
    icon_template: &str,
    output: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<()> {
    let facade = Facade::new(store, icon_template.to_string());
    let document = facade.export(now).await.context("failed to read time data")?;
    let json = serde_json::to_string_pretty(&document)?;

    match output {
        Some(output) => {
            let path = destination(output, now);
            std::fs::write(&path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(writer, "Exported to {}", path.display())?;
        }
        None => writeln!(writer, "{json}")?,
    }
    Ok(())
}
