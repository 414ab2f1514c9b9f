//! In-memory key-value substrate.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Entries, KeyValueStore, StoreError};

/// Key-value substrate held in process memory.
///
/// Data is lost when the store is dropped. [`MemoryStore::set_unavailable`]
/// makes every operation fail, which lets callers exercise outage handling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the substrate going away (`true`) or coming back (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Entries, StoreError> {
        self.check_available()?;
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, new_entries: Entries) -> Result<(), StoreError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        entries.extend(new_entries);
        Ok(())
    }

    async fn transact<F, T>(&self, keys: &[&str], f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Entries) -> Result<(Entries, T), StoreError> + Send,
        T: Send,
    {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        let current = keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect();
        let (updates, result) = f(current)?;
        entries.extend(updates);
        Ok(result)
    }
}
