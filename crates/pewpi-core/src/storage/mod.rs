//! Storage layer
//!
//! Collections are persisted through a string key-value contract
//! (`KeyValueStore`), one serialized JSON array per collection.
//!
//! ## Backends
//!
//! - **memory**: process-local map, optionally with a byte quota
//! - **file**: one JSON file per key, written atomically
//! - **sqlite**: one row per key in a single table

pub mod error;
pub mod file;
pub mod kv;
pub mod persistence;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Config, StorageBackend};

pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use kv::{KeyValueStore, MemoryStorage};
pub use persistence::{storage_key, CollectionPersistence};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteStorage;

/// Open the backend selected by the configuration
pub fn open_backend(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let storage: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::File => {
            let dir = config.storage_dir();
            Arc::new(
                FileStorage::open(&dir)
                    .with_context(|| format!("Failed to open storage directory {:?}", dir))?,
            )
        }
        StorageBackend::Sqlite => {
            let path = config.sqlite_path();
            Arc::new(
                SqliteStorage::open(&path)
                    .with_context(|| format!("Failed to open SQLite database {:?}", path))?,
            )
        }
    };
    Ok(storage)
}
