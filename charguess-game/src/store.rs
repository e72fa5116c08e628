//! Persistent key-value store abstraction.
//!
//! Sessions, cache entries and score counters all live behind [`KvStore`].
//! Platform-specific implementations should provide durable storage; the
//! in-memory [`MemoryStore`] backs tests and ephemeral runs.
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Backend(String),
    #[error("value at {table}/{key} is not numeric")]
    NotNumeric { table: String, key: String },
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Namespaced key-value storage with the atomic primitives the engine needs.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Write a value only when the key is absent. Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    async fn set_if_absent(&self, table: &str, key: &str, value: Value)
    -> Result<bool, StoreError>;

    /// Replace a value only when it currently equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    async fn compare_and_swap(
        &self,
        table: &str,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError>;

    /// Remove a value. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError>;

    /// Remove every value in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    async fn delete_all(&self, table: &str) -> Result<(), StoreError>;

    /// Atomically add `delta` to an integer value (absent counts as zero).
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value is not an integer.
    async fn increment(&self, table: &str, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Snapshot of every entry in a table, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn entries(&self, table: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

#[async_trait::async_trait]
impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(table, key).await
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(table, key, value).await
    }

    async fn set_if_absent(
        &self,
        table: &str,
        key: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        (**self).set_if_absent(table, key, value).await
    }

    async fn compare_and_swap(
        &self,
        table: &str,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(table, key, expected, new).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        (**self).delete(table, key).await
    }

    async fn delete_all(&self, table: &str) -> Result<(), StoreError> {
        (**self).delete_all(table).await
    }

    async fn increment(&self, table: &str, key: &str, delta: i64) -> Result<i64, StoreError> {
        (**self).increment(table, key, delta).await
    }

    async fn entries(&self, table: &str) -> Result<Vec<(String, Value)>, StoreError> {
        (**self).entries(table).await
    }
}

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// Process-local store. Every operation holds one lock, so each is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        table: &str,
        key: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let entries = tables.entry(table.to_string()).or_default();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        table: &str,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(current) = tables.get_mut(table).and_then(|t| t.get_mut(key)) else {
            return Ok(false);
        };
        if current != expected {
            return Ok(false);
        }
        *current = new;
        Ok(true)
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .get_mut(table)
            .is_some_and(|t| t.remove(key).is_some()))
    }

    async fn delete_all(&self, table: &str) -> Result<(), StoreError> {
        self.lock().remove(table);
        Ok(())
    }

    async fn increment(&self, table: &str, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut tables = self.lock();
        let slot = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(Value::from(0));
        let current = slot.as_i64().ok_or_else(|| StoreError::NotNumeric {
            table: table.to_string(),
            key: key.to_string(),
        })?;
        let next = current.saturating_add(delta);
        *slot = Value::from(next);
        Ok(next)
    }

    async fn entries(&self, table: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self
            .lock()
            .get(table)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
