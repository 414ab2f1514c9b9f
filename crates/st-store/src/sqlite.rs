//! SQLite-backed key-value substrate.
//!
//! # Schema
//!
//! One table, `kv`, maps a storage key to a JSON document stored as TEXT.
//! `updated_at` is ISO 8601 UTC (e.g., `2024-01-15T10:30:00Z`) and records the
//! last write of that key.
//!
//! # Concurrency
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so the connection lives
//! behind a `Mutex` and every statement runs on tokio's blocking pool.
//!
//! Several `st` processes may open the same file. Every read runs in one
//! deferred transaction and every [`KeyValueStore::transact`] holds a
//! `BEGIN IMMEDIATE` write lock from its read through its write, so another
//! connection's read-modify-write cannot land in between. A busy database is
//! retried for up to [`BUSY_TIMEOUT`] before the operation fails.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::{Entries, KeyValueStore, StoreError};

/// How long a statement waits for another connection's lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Key-value substrate stored in a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    // Held across the blocking hops of one transaction.
    session: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the store is dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            session: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}

/// Initializes the database schema.
///
/// This is idempotent - safe to call on an already-initialized database.
fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Opens a transaction, first abandoning one left behind by a cancelled caller.
fn begin(conn: &Connection, behavior: &str) -> Result<(), StoreError> {
    if !conn.is_autocommit() {
        tracing::warn!("rolling back abandoned sqlite transaction");
        conn.execute_batch("ROLLBACK")?;
    }
    conn.execute_batch(behavior)?;
    Ok(())
}

fn rollback(conn: &Connection) {
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        tracing::warn!(%err, "sqlite rollback failed");
    }
}

fn read(conn: &Connection, keys: &[String]) -> Result<Entries, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?")?;
    let mut entries = Entries::new();
    for key in keys {
        let raw: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        if let Some(raw) = raw {
            let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: key.clone(),
                source,
            })?;
            entries.insert(key.clone(), value);
        }
    }
    Ok(entries)
}

fn write(conn: &Connection, entries: &Entries) -> Result<(), StoreError> {
    let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut stmt = conn.prepare_cached(
        "
        INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        ",
    )?;
    for (key, value) in entries {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        stmt.execute(params![key, raw, updated_at])?;
    }
    Ok(())
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| (*k).to_string()).collect()
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<Entries, StoreError> {
        let keys = owned(keys);
        let _session = self.session.lock().await;
        self.blocking(move |conn| {
            begin(conn, "BEGIN DEFERRED")?;
            let entries = read(conn, &keys).inspect_err(|_| rollback(conn))?;
            conn.execute_batch("COMMIT")?;
            Ok(entries)
        })
        .await
    }

    async fn set(&self, entries: Entries) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.transact(&[], |_| Ok((entries, ()))).await
    }

    async fn transact<F, T>(&self, keys: &[&str], f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Entries) -> Result<(Entries, T), StoreError> + Send,
        T: Send,
    {
        let keys = owned(keys);
        let _session = self.session.lock().await;

        let current = self
            .blocking(move |conn| {
                begin(conn, "BEGIN IMMEDIATE")?;
                read(conn, &keys).inspect_err(|_| rollback(conn))
            })
            .await?;

        let (entries, result) = match f(current) {
            Ok(applied) => applied,
            Err(err) => {
                self.blocking(|conn| {
                    rollback(conn);
                    Ok(())
                })
                .await?;
                return Err(err);
            }
        };

        self.blocking(move |conn| {
            write(conn, &entries)
                .and_then(|()| Ok(conn.execute_batch("COMMIT")?))
                .inspect_err(|_| rollback(conn))
        })
        .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_roundtrips_json() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut entries = Entries::new();
        entries.insert("timeData".to_string(), json!({"example.com": {"totalTime": 3}}));
        store.set(entries).await.unwrap();

        let got = store.get(&["timeData", "dailyData"]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["timeData"]["example.com"]["totalTime"], 3);
    }

    #[tokio::test]
    async fn set_overwrites_existing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        for n in [1, 2] {
            let mut entries = Entries::new();
            entries.insert("k".to_string(), json!(n));
            store.set(entries).await.unwrap();
        }
        assert_eq!(store.get(&["k"]).await.unwrap()["k"], json!(2));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("st.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            let mut entries = Entries::new();
            entries.insert("dailyData".to_string(), json!({"2025-03-10": {"a.com": 1}}));
            store.set(entries).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let got = store.get(&["dailyData"]).await.unwrap();
        assert_eq!(got["dailyData"]["2025-03-10"]["a.com"], 1);
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut entries = Entries::new();
        entries.insert("k".to_string(), json!(1));
        store.set(entries).await.unwrap();

        let result: Result<(), _> = store
            .transact(&["k"], |_| Err(StoreError::Unavailable("refused".to_string())))
            .await;
        assert!(result.is_err());

        // The connection is usable again and the old value survived.
        let bumped = store
            .transact(&["k"], |current| {
                let n = current["k"].as_u64().unwrap_or(0) + 1;
                let mut updates = Entries::new();
                updates.insert("k".to_string(), json!(n));
                Ok((updates, n))
            })
            .await
            .unwrap();
        assert_eq!(bumped, 2);
        assert_eq!(store.get(&["k"]).await.unwrap()["k"], json!(2));
    }

    #[tokio::test]
    async fn write_waits_for_another_connections_transaction() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("st.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        // Hold a write lock on the first connection while the second writes.
        first
            .blocking(|conn| {
                conn.execute_batch("BEGIN IMMEDIATE")?;
                Ok(())
            })
            .await
            .unwrap();
        let writer = tokio::spawn(async move {
            let mut entries = Entries::new();
            entries.insert("k".to_string(), json!("second"));
            second.set(entries).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!writer.is_finished());

        first
            .blocking(|conn| {
                conn.execute_batch("COMMIT")?;
                Ok(())
            })
            .await
            .unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(first.get(&["k"]).await.unwrap()["k"], json!("second"));
    }

    #[tokio::test]
    async fn corrupt_row_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .blocking(|conn| {
                conn.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES ('timeData', '{not json', '2025-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let err = store.get(&["timeData"]).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
