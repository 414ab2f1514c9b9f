//! Retention sweep over the daily aggregate.

use chrono::{DateTime, NaiveDate, Utc};

use st_core::{date_of, retention};
use st_store::{AggregateStore, KeyValueStore, StoreError};

/// Deletes every daily bucket dated `retention_days` or more before the date
/// of `now`. Returns the removed dates.
///
/// Safe to run at any time; a second run with the same `now` removes nothing.
pub async fn sweep<S: KeyValueStore>(
    store: &AggregateStore<S>,
    now: DateTime<Utc>,
    retention_days: u32,
) -> Result<Vec<NaiveDate>, StoreError> {
    let today = date_of(now);
    let removed = store
        .update_daily(|daily| retention::purge_expired(daily, today, retention_days))
        .await?;
    if removed.is_empty() {
        tracing::debug!(%today, "retention sweep found nothing to remove");
    } else {
        tracing::info!(%today, removed = removed.len(), "removed expired daily buckets");
    }
    Ok(removed)
}
