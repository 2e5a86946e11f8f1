//! Key-value storage contract
//!
//! Every collection is persisted as one string value under one key.
//! Backends only need synchronous `get`/`set`/`remove`/`clear`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::{StorageError, StorageResult};

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key` (no-op if absent)
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Remove every key
    fn clear(&self) -> StorageResult<()>;

    /// List stored keys, sorted
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// In-memory backend, the equivalent of a browser's local storage
///
/// An optional byte quota (keys + values) makes writes fail the way a full
/// browser storage area does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Create an unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory store that rejects writes beyond `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Bytes currently used (keys + values)
    pub fn used_bytes(&self) -> usize {
        usage(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn usage(entries: &HashMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.lock();

        if let Some(quota) = self.quota {
            let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let used = usage(&entries) - replaced;
            let requested = key.len() + value.len();
            if used + requested > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    quota,
                    used,
                    requested,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.lock().clear();
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_returns_none() {
        let storage = MemoryStorage::new();
        assert!(storage.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_set_get_remove() {
        let storage = MemoryStorage::new();
        storage.set("a", "1").unwrap();
        storage.set("a", "2").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("2"));

        storage.remove("a").unwrap();
        assert!(storage.get("a").unwrap().is_none());

        // Removing again is fine
        storage.remove("a").unwrap();
    }

    #[test]
    fn test_clear_and_keys() {
        let storage = MemoryStorage::new();
        storage.set("b", "x").unwrap();
        storage.set("a", "y").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);

        storage.clear().unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let storage = MemoryStorage::with_quota(10);
        storage.set("k", "12345").unwrap();

        let err = storage.set("other", "123456").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));

        // Original value untouched
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("12345"));
        assert_eq!(storage.used_bytes(), 6);
    }

    #[test]
    fn test_quota_counts_replacement_not_sum() {
        let storage = MemoryStorage::with_quota(10);
        storage.set("k", "12345678").unwrap();
        // Replacing the same key only needs room for the new value
        storage.set("k", "87654321").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("87654321"));
    }
}
