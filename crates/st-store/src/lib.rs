//! Storage layer for the screen-time tracker.
//!
//! Persistence is split in two layers:
//! - [`KeyValueStore`]: the substrate, an async get/set of whole JSON values by
//!   key. [`SqliteStore`] keeps them in a single `kv` table; [`MemoryStore`] keeps
//!   them in memory.
//! - [`AggregateStore`]: the adapter that reads and writes the two named
//!   aggregates (`timeData`, `dailyData`) on top of a substrate.
//!
//! # Serialization
//!
//! Every read-modify-write goes through [`KeyValueStore::transact`], which the
//! substrate runs as one atomic step: [`SqliteStore`] holds a database write
//! lock from the read through the write, so separate processes sharing one
//! file cannot interleave. Within a process, the [`AggregateStore`] also
//! queues its callers on an async mutex. Two flushes can therefore never read
//! the same pre-update aggregate, a flush cannot overwrite a reset, and
//! readers never observe a half-applied update.

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use st_core::{Aggregates, DAILY_DATA_KEY, DailyData, TIME_DATA_KEY, TimeData};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// JSON values keyed by storage key.
pub type Entries = serde_json::Map<String, Value>;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored value could not be decoded.
    #[error("invalid data under {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A value could not be encoded for storage.
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The substrate refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Durable key-value substrate holding whole JSON values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the values stored under `keys`. Missing keys are absent from the
    /// result.
    async fn get(&self, keys: &[&str]) -> Result<Entries, StoreError>;

    /// Stores every entry. Either all entries are written or none are.
    async fn set(&self, entries: Entries) -> Result<(), StoreError>;

    /// Reads `keys`, hands them to `f`, and stores the entries `f` returns.
    ///
    /// No other write to the substrate lands between the read and the write,
    /// including writes from other handles on the same storage. Nothing is
    /// written when `f` fails.
    async fn transact<F, T>(&self, keys: &[&str], f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Entries) -> Result<(Entries, T), StoreError> + Send,
        T: Send;
}

fn decode<T: DeserializeOwned + Default>(entries: &mut Entries, key: &str) -> Result<T, StoreError> {
    match entries.remove(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        }),
    }
}

fn encode<T: Serialize>(entries: &mut Entries, key: &str, value: &T) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    entries.insert(key.to_string(), value);
    Ok(())
}

fn decode_aggregates(mut entries: Entries) -> Result<Aggregates, StoreError> {
    Ok(Aggregates {
        time_data: decode::<TimeData>(&mut entries, TIME_DATA_KEY)?,
        daily_data: decode::<DailyData>(&mut entries, DAILY_DATA_KEY)?,
    })
}

/// Reads and writes the lifetime and daily aggregates on a substrate.
pub struct AggregateStore<S> {
    substrate: S,
    lock: Mutex<()>,
}

impl<S: KeyValueStore> AggregateStore<S> {
    pub fn new(substrate: S) -> Self {
        Self {
            substrate,
            lock: Mutex::new(()),
        }
    }

    /// Returns the underlying substrate.
    pub const fn substrate(&self) -> &S {
        &self.substrate
    }

    /// Writes empty aggregates for any key that has never been stored.
    ///
    /// Existing data is left untouched.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.substrate
            .transact(&[TIME_DATA_KEY, DAILY_DATA_KEY], |existing| {
                let mut missing = Entries::new();
                for key in [TIME_DATA_KEY, DAILY_DATA_KEY] {
                    if !existing.contains_key(key) {
                        missing.insert(key.to_string(), Value::Object(Entries::new()));
                    }
                }
                if !missing.is_empty() {
                    tracing::debug!(keys = ?missing.keys().collect::<Vec<_>>(), "initializing storage");
                }
                Ok((missing, ()))
            })
            .await
    }

    async fn load(&self) -> Result<Aggregates, StoreError> {
        let entries = self.substrate.get(&[TIME_DATA_KEY, DAILY_DATA_KEY]).await?;
        decode_aggregates(entries)
    }

    /// Returns both aggregates exactly as persisted.
    pub async fn snapshot(&self) -> Result<Aggregates, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Loads both aggregates, applies `f`, and persists both in one write.
    ///
    /// Nothing is written if loading fails.
    pub async fn update<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Aggregates) -> T + Send,
        T: Send,
    {
        let _guard = self.lock.lock().await;
        self.substrate
            .transact(&[TIME_DATA_KEY, DAILY_DATA_KEY], |entries| {
                let mut aggregates = decode_aggregates(entries)?;
                let result = f(&mut aggregates);

                let mut entries = Entries::new();
                encode(&mut entries, TIME_DATA_KEY, &aggregates.time_data)?;
                encode(&mut entries, DAILY_DATA_KEY, &aggregates.daily_data)?;
                Ok((entries, result))
            })
            .await
    }

    /// Loads the daily aggregate, applies `f`, and persists it.
    ///
    /// The lifetime aggregate is neither read nor written.
    pub async fn update_daily<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut DailyData) -> T + Send,
        T: Send,
    {
        let _guard = self.lock.lock().await;
        self.substrate
            .transact(&[DAILY_DATA_KEY], |mut entries| {
                let mut daily = decode::<DailyData>(&mut entries, DAILY_DATA_KEY)?;
                let result = f(&mut daily);

                let mut entries = Entries::new();
                encode(&mut entries, DAILY_DATA_KEY, &daily)?;
                Ok((entries, result))
            })
            .await
    }

    /// Replaces both aggregates with empty mappings.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = Entries::new();
        entries.insert(TIME_DATA_KEY.to_string(), Value::Object(Entries::new()));
        entries.insert(DAILY_DATA_KEY.to_string(), Value::Object(Entries::new()));
        self.substrate.set(entries).await
    }
}
