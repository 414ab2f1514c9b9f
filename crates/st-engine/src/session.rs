//! The active attribution session.
//!
//! A [`Session`] knows which domain is accruing time and since when. It is the
//! single source of truth for "what is active right now" and is owned by the
//! engine's event loop; nothing else mutates it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use st_core::Domain;
use st_store::StoreError;

/// Destination for flushed time.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Adds `seconds` to `domain`'s lifetime total and to the bucket of the
    /// calendar date of `now`.
    async fn accumulate(&self, domain: &Domain, seconds: u64, now: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Time owed to a domain that has been computed but not necessarily stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub domain: Domain,
    pub seconds: u64,
    pub at: DateTime<Utc>,
}

/// Session state errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `begin` was called while another domain was still active.
    #[error("a session for {domain} is already active")]
    AlreadyActive { domain: Domain },
}

/// A flush whose contribution could not be stored.
#[derive(Debug, Error)]
#[error("failed to record {}s for {}: {source}", .contribution.seconds, .contribution.domain)]
pub struct FlushError {
    /// The time that was not stored.
    pub contribution: Contribution,
    #[source]
    pub source: StoreError,
}

/// The domain currently accruing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub domain: Domain,
    pub started_at: DateTime<Utc>,
}

/// At most one active session.
#[derive(Debug, Default)]
pub struct Session {
    active: Option<ActiveSession>,
}

impl Session {
    pub const fn new() -> Self {
        Self { active: None }
    }

    pub const fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn domain(&self) -> Option<&Domain> {
        self.active.as_ref().map(|a| &a.domain)
    }

    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts accruing time for `domain`. Fails if a session is already active.
    pub fn begin(&mut self, domain: Domain, now: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyActive {
                domain: active.domain.clone(),
            });
        }
        self.active = Some(ActiveSession {
            domain,
            started_at: now,
        });
        Ok(())
    }

    /// Whole seconds elapsed since the session started. Zero when inactive or
    /// when `now` is before the start.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.active.as_ref().map_or(0, |active| {
            u64::try_from((now - active.started_at).num_seconds()).unwrap_or(0)
        })
    }

    /// Moves the start of the active session to `now`, keeping its domain.
    pub fn restart(&mut self, now: DateTime<Utc>) {
        if let Some(active) = &mut self.active {
            active.started_at = now;
        }
    }

    /// Writes the elapsed time of the active session to `sink`.
    ///
    /// Less than one second is dropped. The session itself is left as is;
    /// returns the number of seconds written.
    pub async fn flush<K>(&self, now: DateTime<Utc>, sink: &K) -> Result<u64, FlushError>
    where
        K: Sink + ?Sized,
    {
        let Some(active) = &self.active else {
            return Ok(0);
        };
        let seconds = self.elapsed_seconds(now);
        if seconds < 1 {
            return Ok(0);
        }
        match sink.accumulate(&active.domain, seconds, now).await {
            Ok(()) => Ok(seconds),
            Err(source) => Err(FlushError {
                contribution: Contribution {
                    domain: active.domain.clone(),
                    seconds,
                    at: now,
                },
                source,
            }),
        }
    }

    /// Flushes, then clears the session. The session is cleared even when the
    /// flush fails; the error carries the unstored contribution.
    pub async fn stop<K>(&mut self, now: DateTime<Utc>, sink: &K) -> Result<u64, FlushError>
    where
        K: Sink + ?Sized,
    {
        let result = self.flush(now, sink).await;
        self.active = None;
        result
    }

    /// Flushes the current session, then starts a new one for `domain` at `now`.
    ///
    /// The switch always happens; a failed flush is reported through the
    /// returned error.
    pub async fn switch_to<K>(&mut self, domain: Domain, now: DateTime<Utc>, sink: &K) -> Result<u64, FlushError>
    where
        K: Sink + ?Sized,
    {
        let result = self.stop(now, sink).await;
        self.active = Some(ActiveSession {
            domain,
            started_at: now,
        });
        result
    }
}
