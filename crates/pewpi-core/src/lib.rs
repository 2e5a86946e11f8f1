//! PewPi Core Library
//!
//! This crate provides the core functionality for PewPi: a schema-validated
//! document store over a key-value persistence API, with a token ledger,
//! change notifications and encrypted backups layered on top.
//!
//! # Architecture
//!
//! - **Collections** hold records in memory and write the whole collection
//!   as one JSON array per storage key on every mutation
//! - **Backends** implement `KeyValueStore` (memory, file, SQLite)
//! - **Ledger** is a collection of tokens with balances and pub/sub
//!
//! # Quick Start
//!
//! ```text
//! let mut store = Store::open()?;
//!
//! // Mint a token for the current user
//! let token = store.ledger_mut().create_token(NewToken::new(TokenType::Gold))?;
//!
//! // Documents with a schema
//! let schema = Schema::new().field("name", FieldSpec::text().required().min_length(2));
//! let mut users = store.collection("users", schema);
//! users.create(json!({"name": "Bo"}))?;
//! ```
//!
//! # Modules
//!
//! - `store`: Entry point owning the backend and ledger
//! - `schema`: Field descriptors and validation
//! - `collection`: CRUD and queries over a persisted collection
//! - `models`: Records and query filters
//! - `ledger`: Tokens, balances and events
//! - `crypto`: Password-based encryption
//! - `session`: Session token with cross-session broadcast
//! - `remote`: GitHub contents API client
//! - `backup`: Encrypted ledger export, import, push and pull
//! - `storage`: Key-value backends and collection persistence
//! - `config`: Application configuration

pub mod backup;
pub mod collection;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod models;
pub mod remote;
pub mod schema;
pub mod session;
pub mod storage;
pub mod store;

pub use backup::{BackupError, LedgerExport, RemoteTarget};
pub use collection::Collection;
pub use config::{Config, RemoteConfig, StorageBackend};
pub use crypto::{Cipher, CryptoError, EncryptedBlob};
pub use error::{ModelError, PersistenceError, SchemaError, ValidationError};
pub use ledger::{
    Event, Ledger, LedgerError, NewToken, Subscription, Token, TokenStatus, TokenType,
};
pub use models::{Fields, Query, Record};
pub use remote::{GitHubClient, RemoteContent, RemoteError};
pub use schema::{FieldSpec, FieldType, Schema, ValidationResult};
pub use session::{BroadcastHub, Session};
pub use storage::{KeyValueStore, StorageError};
pub use store::{Store, StoreStats};
