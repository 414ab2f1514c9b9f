//! Focus event routing.
//!
//! The [`Tracker`] turns host events into session commands. It enforces the
//! closure rule: the outgoing domain is always flushed before a new session
//! begins, so no time is attributed to the wrong domain and no span is counted
//! twice.
//!
//! # Store failures
//!
//! A periodic or blur flush that cannot be stored leaves the session clock
//! alone, so the next flush retries with the cumulative elapsed time. A flush
//! forced by a switch or stop cannot wait for the next tick because the active
//! domain changes; its contribution is parked in a backlog and written, in
//! order and with its original instant, before the next write.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use st_core::{EngineConfig, TabId, extract};
use st_store::{AggregateStore, KeyValueStore, StoreError};

use crate::event::FocusEvent;
use crate::host::HostBrowser;
use crate::session::{Contribution, FlushError, Session, Sink};
use crate::sink::StoreSink;
use crate::sweeper;

/// Owner of the active session and the routed tab.
pub struct Tracker<H, S> {
    host: H,
    store: Arc<AggregateStore<S>>,
    sink: StoreSink<S>,
    session: Session,
    active_tab: Option<TabId>,
    backlog: VecDeque<Contribution>,
    config: EngineConfig,
}

impl<H: HostBrowser, S: KeyValueStore> Tracker<H, S> {
    pub fn new(host: H, store: Arc<AggregateStore<S>>, config: EngineConfig) -> Self {
        let sink = StoreSink::new(Arc::clone(&store), config.icon_template.clone());
        Self {
            host,
            store,
            sink,
            session: Session::new(),
            active_tab: None,
            backlog: VecDeque::new(),
            config,
        }
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Tab that owns the active session.
    pub const fn active_tab(&self) -> Option<TabId> {
        self.active_tab
    }

    /// Contributions waiting to be stored after a failed switch or stop.
    pub const fn backlog(&self) -> &VecDeque<Contribution> {
        &self.backlog
    }

    pub const fn store(&self) -> &Arc<AggregateStore<S>> {
        &self.store
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prepares storage, sweeps expired buckets, and begins attributing the
    /// focused tab.
    pub async fn start(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self.store.initialize().await {
            tracing::warn!(error = %e, "failed to initialize storage");
        }
        if let Err(e) = self.sweep(now).await {
            tracing::warn!(error = %e, "startup retention sweep failed");
        }
        match self.host.focused_tab().await {
            Ok(Some(tab)) => self.switch_or_clear(tab.url.as_deref(), tab.id, now).await,
            Ok(None) => tracing::debug!("no focused tab at startup"),
            Err(e) => tracing::warn!(error = %e, "failed to resolve focused tab at startup"),
        }
    }

    /// Routes one host event.
    pub async fn handle(&mut self, event: FocusEvent, now: DateTime<Utc>) {
        match event {
            FocusEvent::TabActivated { tab_id, .. } => match self.host.tab(tab_id).await {
                Ok(tab) => self.switch_or_clear(tab.url.as_deref(), tab.id, now).await,
                Err(e) => {
                    tracing::warn!(tab = %tab_id, error = %e, "failed to resolve activated tab");
                    self.clear(now).await;
                }
            },
            FocusEvent::TabUpdated {
                tab_id,
                url: Some(url),
            } if self.active_tab == Some(tab_id) => {
                self.switch_or_clear(Some(url.as_str()), tab_id, now).await;
            }
            FocusEvent::TabRemoved { tab_id } if self.active_tab == Some(tab_id) => {
                self.clear(now).await;
            }
            FocusEvent::TabUpdated { .. } | FocusEvent::TabRemoved { .. } => {}
            FocusEvent::WindowFocusChanged { window_id: None } => {
                self.checkpoint(now).await;
            }
            FocusEvent::WindowFocusChanged {
                window_id: Some(window_id),
            } => match self.host.active_tab(window_id).await {
                Ok(Some(tab)) => self.switch_or_clear(tab.url.as_deref(), tab.id, now).await,
                Ok(None) => self.clear(now).await,
                Err(e) => {
                    tracing::warn!(window = %window_id, error = %e, "failed to resolve focused window");
                    self.clear(now).await;
                }
            },
        }
    }

    /// Periodic flush tick. Does nothing without an active session or backlog.
    pub async fn periodic_flush(&mut self, now: DateTime<Utc>) {
        if self.session.is_active() {
            self.checkpoint(now).await;
        } else if !self.backlog.is_empty() {
            self.drain_backlog().await;
        }
    }

    /// Retention sweep tick.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, StoreError> {
        sweeper::sweep(&self.store, now, self.config.retention_days).await
    }

    /// Stops the session with a final flush.
    pub async fn shutdown(&mut self, now: DateTime<Utc>) {
        self.clear(now).await;
        if !self.backlog.is_empty() {
            tracing::warn!(
                pending = self.backlog.len(),
                "shutting down with unsaved time"
            );
        }
    }

    /// Drops parked contributions. Used after a full reset, when the time they
    /// describe no longer belongs to any record.
    pub fn discard_backlog(&mut self) {
        self.backlog.clear();
    }

    async fn switch_or_clear(&mut self, url: Option<&str>, tab_id: TabId, now: DateTime<Utc>) {
        let Some(domain) = url.and_then(extract) else {
            tracing::debug!(tab = %tab_id, "no attributable domain");
            self.clear(now).await;
            return;
        };
        self.drain_backlog().await;
        tracing::debug!(%domain, tab = %tab_id, "tracking");
        let result = self.session.switch_to(domain, now, &self.sink).await;
        self.active_tab = Some(tab_id);
        self.park_failed(result);
    }

    async fn clear(&mut self, now: DateTime<Utc>) {
        self.drain_backlog().await;
        let result = self.session.stop(now, &self.sink).await;
        self.active_tab = None;
        self.park_failed(result);
    }

    /// Flushes and restarts the clock for the same domain. On failure the clock
    /// is left untouched so the next flush covers the whole span.
    async fn checkpoint(&mut self, now: DateTime<Utc>) {
        if !self.session.is_active() {
            return;
        }
        self.drain_backlog().await;
        match self.session.flush(now, &self.sink).await {
            Ok(_) => self.session.restart(now),
            Err(e) => tracing::warn!(error = %e, "flush failed; keeping session clock"),
        }
    }

    fn park_failed(&mut self, result: Result<u64, FlushError>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "flush failed; parking unsaved time");
            self.backlog.push_back(e.contribution);
        }
    }

    async fn drain_backlog(&mut self) {
        while let Some(pending) = self.backlog.front().cloned() {
            match self
                .sink
                .accumulate(&pending.domain, pending.seconds, pending.at)
                .await
            {
                Ok(()) => {
                    self.backlog.pop_front();
                }
                Err(e) => {
                    tracing::warn!(error = %e, pending = self.backlog.len(), "backlog still unsaved");
                    return;
                }
            }
        }
    }
}
