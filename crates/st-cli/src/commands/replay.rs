//! Replay command: deterministic attribution of a recorded feed.
//!
//! Events are routed at their recorded instants. Between events, periodic
//! flush ticks are simulated every `flush_interval` starting from the first
//! event, so the result matches what a live engine would have stored. After
//! the last event the retention sweep runs and the session is stopped.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};

use st_core::EngineConfig;
use st_engine::{FeedRecord, FocusEvent, TabRegistry, Tracker};
use st_store::{AggregateStore, KeyValueStore};

/// What a replay did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub ticks: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub expired_buckets: usize,
}

impl fmt::Display for ReplayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.first, self.last) {
            (Some(first), Some(last)) => write!(
                f,
                "Replayed {} events from {} to {} ({} flush ticks, {} expired buckets removed)",
                self.events,
                first.to_rfc3339(),
                last.to_rfc3339(),
                self.ticks,
                self.expired_buckets
            ),
            _ => f.write_str("No events to replay"),
        }
    }
}

/// Parses a feed. Every record needs an `at`, and instants may not go back.
pub fn parse_feed(input: &str) -> Result<Vec<(FocusEvent, DateTime<Utc>)>> {
    let mut events = Vec::new();
    let mut previous: Option<DateTime<Utc>> = None;
    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: FeedRecord =
            serde_json::from_str(line).with_context(|| format!("invalid event on line {line_number}"))?;
        let Some(at) = record.at else {
            bail!("event on line {line_number} has no `at` timestamp");
        };
        if previous.is_some_and(|p| at < p) {
            bail!("event on line {line_number} is earlier than the event before it");
        }
        previous = Some(at);
        events.push((record.event, at));
    }
    Ok(events)
}

/// Replays `input` into `store`.
pub async fn run<S>(store: Arc<AggregateStore<S>>, config: EngineConfig, input: &str) -> Result<ReplayStats>
where
    S: KeyValueStore,
{
    let events = parse_feed(input)?;
    let mut stats = ReplayStats {
        events: events.len(),
        ticks: 0,
        first: events.first().map(|(_, at)| *at),
        last: events.last().map(|(_, at)| *at),
        expired_buckets: 0,
    };
    let (Some(first), Some(last)) = (stats.first, stats.last) else {
        return Ok(stats);
    };

    let tick = TimeDelta::from_std(config.flush_interval).context("flush interval out of range")?;
    if tick <= TimeDelta::zero() {
        bail!("flush interval must be positive");
    }

    let registry = TabRegistry::new();
    let mut tracker = Tracker::new(registry.clone(), store, config);
    tracker.start(first).await;

    let mut next_tick = first + tick;
    for (event, at) in events {
        while next_tick <= at {
            tracker.periodic_flush(next_tick).await;
            stats.ticks += 1;
            next_tick += tick;
        }
        registry.observe(&event);
        tracker.handle(event, at).await;
    }

    stats.expired_buckets = tracker.sweep(last).await.context("retention sweep failed")?.len();
    tracker.shutdown(last).await;
    if !tracker.backlog().is_empty() {
        bail!("{} contributions could not be stored", tracker.backlog().len());
    }
    Ok(stats)
}
