//! Run command: live tracking from an event feed.
//!
//! Reads JSON-lines focus events, keeps an in-memory model of the browser's
//! tabs and windows, and hands each event to a running engine. The engine's
//! own timers drive periodic flushes and the retention sweep. EOF shuts the
//! engine down, which flushes the active session.
//!
//! Every event is stamped on arrival. The engine's ticks and its shutdown
//! flush read the wall clock, so a recorded `at` would be measured against
//! the present. Such lines stop the run; `st replay` handles recorded feeds.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use st_core::EngineConfig;
use st_engine::{Engine, EngineHandle, FeedRecord, TabRegistry};
use st_store::{AggregateStore, KeyValueStore};

/// Feeds `input` to a live engine until EOF. Returns the number of events
/// delivered; malformed lines are logged and skipped.
///
/// A line carrying an `at` timestamp fails the run. Events delivered before
/// it are still flushed.
pub async fn run<S, R>(store: Arc<AggregateStore<S>>, config: EngineConfig, input: R) -> Result<usize>
where
    S: KeyValueStore + 'static,
    R: AsyncBufRead + Unpin,
{
    let registry = TabRegistry::new();
    let (handle, task) = Engine::new(registry.clone(), store, config).spawn();

    let fed = forward(&handle, &registry, input).await;

    handle.shutdown().await?;
    task.await.context("engine task failed")?;
    let delivered = fed?;
    tracing::info!(events = delivered, "event feed closed");
    Ok(delivered)
}

async fn forward<R>(handle: &EngineHandle, registry: &TabRegistry, input: R) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line_number = 0_usize;
    let mut delivered = 0_usize;
    while let Some(line) = lines.next_line().await.context("failed to read event feed")? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: FeedRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "skipping malformed event");
                continue;
            }
        };
        if let Some(at) = record.at {
            bail!(
                "line {line_number} is stamped {at}; live feeds are stamped on arrival, \
                 use `st replay` for recorded feeds"
            );
        }
        registry.observe(&record.event);
        handle.deliver(record.event, Utc::now()).await?;
        delivered += 1;
    }
    Ok(delivered)
}
