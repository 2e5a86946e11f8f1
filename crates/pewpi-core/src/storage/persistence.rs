//! Collection persistence
//!
//! Translates a collection's records to and from its key-value entry.
//! The whole collection is one JSON array stored under
//! `"<namespace>_<collection>"`.
//!
//! Loading never fails: a missing key, an unreadable backend or content
//! that does not parse all degrade to an empty collection. Saving reports
//! every failure as a `PersistenceError`.

use std::sync::Arc;

use tracing::{debug, warn};

use super::kv::KeyValueStore;
use crate::error::PersistenceError;
use crate::models::Record;

/// Storage key for a collection
pub fn storage_key(namespace: &str, collection: &str) -> String {
    format!("{namespace}_{collection}")
}

/// Persistence handler for one collection
#[derive(Clone)]
pub struct CollectionPersistence {
    storage: Arc<dyn KeyValueStore>,
    key: String,
}

impl CollectionPersistence {
    /// Bind a persistence handler to `(namespace, collection)`
    pub fn new(storage: Arc<dyn KeyValueStore>, namespace: &str, collection: &str) -> Self {
        Self {
            storage,
            key: storage_key(namespace, collection),
        }
    }

    /// The storage key this handler reads and writes
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The backend this handler writes to
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Load the stored records
    pub fn load(&self) -> Vec<Record> {
        let content = match self.storage.get(&self.key) {
            Ok(Some(content)) => content,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read collection, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Record>>(&content) {
            Ok(records) => {
                debug!(key = %self.key, count = records.len(), "Loaded collection");
                records
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored collection is corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Serialize and write the records
    pub fn save(&self, records: &[Record]) -> Result<(), PersistenceError> {
        let content =
            serde_json::to_string(records).map_err(|source| PersistenceError::Serialize {
                key: self.key.clone(),
                source,
            })?;

        self.storage
            .set(&self.key, &content)
            .map_err(|source| PersistenceError::Write {
                key: self.key.clone(),
                source,
            })?;

        debug!(key = %self.key, count = records.len(), bytes = content.len(), "Saved collection");
        Ok(())
    }

    /// Delete the collection's entry entirely
    pub fn remove(&self) -> Result<(), PersistenceError> {
        self.storage
            .remove(&self.key)
            .map_err(|source| PersistenceError::Write {
                key: self.key.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fields;
    use crate::storage::{FileStorage, MemoryStorage};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(name: &str) -> Record {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!(name));
        Record::new(fields)
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key("pewpi_model", "users"), "pewpi_model_users");
        assert_eq!(storage_key("pewpi", "tokens"), "pewpi_tokens");
    }

    #[test]
    fn test_load_missing_is_empty() {
        let persistence =
            CollectionPersistence::new(Arc::new(MemoryStorage::new()), "pewpi_model", "users");
        assert!(persistence.load().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let storage = Arc::new(MemoryStorage::new());
        let persistence = CollectionPersistence::new(storage.clone(), "pewpi_model", "users");

        let records = vec![record("Alice"), record("Bob")];
        persistence.save(&records).unwrap();

        let stored = storage.get("pewpi_model_users").unwrap().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert!(raw.is_array());
        assert_eq!(raw[0]["name"], json!("Alice"));

        assert_eq!(persistence.load(), records);
    }

    #[test]
    fn test_corrupt_content_degrades_to_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("pewpi_model_users", "{not json").unwrap();

        let persistence = CollectionPersistence::new(storage.clone(), "pewpi_model", "users");
        assert!(persistence.load().is_empty());

        // Wrong shape is also corrupt
        storage.set("pewpi_model_users", r#"[{"name":"no id"}]"#).unwrap();
        assert!(persistence.load().is_empty());
    }

    #[test]
    fn test_save_failure_is_persistence_error() {
        let storage = Arc::new(MemoryStorage::with_quota(16));
        let persistence = CollectionPersistence::new(storage, "pewpi_model", "users");

        let err = persistence.save(&[record("Alice")]).unwrap_err();
        assert!(err.is_quota());
        assert_eq!(err.key(), "pewpi_model_users");
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        let users = CollectionPersistence::new(storage.clone(), "pewpi_model", "users");
        let other = CollectionPersistence::new(storage, "other", "users");

        users.save(&[record("Alice")]).unwrap();
        assert_eq!(users.load().len(), 1);
        assert!(other.load().is_empty());
    }

    #[test]
    fn test_file_backend_roundtrip_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::open(temp_dir.path()).unwrap());
        let persistence = CollectionPersistence::new(storage, "pewpi", "tokens");

        persistence.save(&[record("x")]).unwrap();
        assert!(temp_dir.path().join("pewpi_tokens.json").exists());
        assert_eq!(persistence.load().len(), 1);

        persistence.remove().unwrap();
        assert!(persistence.load().is_empty());
    }
}
