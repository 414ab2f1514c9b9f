//! Persistence sink: writes flushed time into both aggregates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use st_core::Domain;
use st_store::{AggregateStore, KeyValueStore, StoreError};

use crate::session::Sink;

/// Sink that records flushes in an [`AggregateStore`].
///
/// Each call is one read-modify-write of both aggregates, serialized by the
/// store's lock.
pub struct StoreSink<S> {
    store: Arc<AggregateStore<S>>,
    icon_template: String,
}

impl<S> StoreSink<S> {
    pub const fn new(store: Arc<AggregateStore<S>>, icon_template: String) -> Self {
        Self {
            store,
            icon_template,
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> Sink for StoreSink<S> {
    async fn accumulate(&self, domain: &Domain, seconds: u64, now: DateTime<Utc>) -> Result<(), StoreError> {
        let icon_template = self.icon_template.as_str();
        self.store
            .update(|aggregates| aggregates.record(domain, seconds, now, icon_template))
            .await?;
        tracing::debug!(%domain, seconds, "saved time");
        Ok(())
    }
}
