//! Application entry point
//!
//! The `Store` owns the configured key-value backend and the token
//! ledger, and hands out document collections, sessions and backup
//! operations bound to that backend. It is constructed once and passed
//! to whatever needs it; there is no global instance.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//!
//! let token = store.ledger_mut().create_token(NewToken::new(TokenType::Gold))?;
//! let balance = store.ledger().get_balance(&token.user_id);
//!
//! let mut users = store.collection("users", schema);
//! users.create(json!({"name": "Bo"}))?;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::backup::{self, RemoteTarget};
use crate::collection::Collection;
use crate::config::{Config, StorageBackend};
use crate::crypto::{Cipher, EncryptedBlob};
use crate::ledger::Ledger;
use crate::remote::{CommitResult, GitHubClient, RemoteContent};
use crate::schema::Schema;
use crate::session::{BroadcastHub, Session};
use crate::storage::{open_backend, KeyValueStore, MemoryStorage};

/// Summary of what the store holds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub backend: StorageBackend,
    pub ledger_key: String,
    pub token_count: usize,
    pub active_tokens: usize,
    pub current_user: String,
    pub current_balance: f64,
    /// Document collections present in storage
    pub collections: Vec<String>,
}

/// Unified storage interface for PewPi
pub struct Store {
    config: Config,
    storage: Arc<dyn KeyValueStore>,
    ledger: Ledger,
    hub: BroadcastHub,
    /// Token slot for remote calls made through this store
    session: Session,
}

impl Store {
    /// Open the store using the configuration file and environment
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let storage = open_backend(&config).context("Failed to open storage backend")?;
        Ok(Self::with_storage(config, storage))
    }

    /// A store whose data lives only as long as the process
    pub fn in_memory() -> Self {
        let config = Config {
            backend: StorageBackend::Memory,
            ..Config::default()
        };
        Self::with_storage(config, Arc::new(MemoryStorage::new()))
    }

    /// Build a store over an already opened backend
    pub fn with_storage(config: Config, storage: Arc<dyn KeyValueStore>) -> Self {
        let ledger = Ledger::open(storage.clone(), &config.ledger_prefix);
        let hub = BroadcastHub::new();
        let session = Session::new(Arc::new(MemoryStorage::new()), hub.clone());
        Self {
            config,
            storage,
            ledger,
            hub,
            session,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    /// Cipher using the configured work factor
    pub fn cipher(&self) -> Cipher {
        Cipher::new(self.config.kdf_iterations)
    }

    /// Open a document collection under the model prefix
    pub fn collection(&self, name: &str, schema: impl Into<Arc<Schema>>) -> Collection {
        Collection::open(schema, name, self.storage.clone(), &self.config.model_prefix)
    }

    /// The store's own session; its token authenticates `github_client`
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// A peer session with its own token slot, sharing this store's broadcast hub
    pub fn new_session(&self) -> Session {
        Session::new(Arc::new(MemoryStorage::new()), self.hub.clone())
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    // ==================== Backup ====================

    /// Configured remote backup location
    pub fn remote_target(&self) -> Option<RemoteTarget> {
        let remote = self.config.remote.as_ref()?;
        if remote.owner.is_empty() || remote.repo.is_empty() {
            return None;
        }
        Some(RemoteTarget {
            owner: remote.owner.clone(),
            repo: remote.repo.clone(),
            branch: remote.branch.clone(),
            path: remote.path.clone(),
        })
    }

    /// GitHub client for the configured API root, authenticated with the session token
    pub fn github_client(&self) -> Result<GitHubClient> {
        let api_url = self
            .config
            .remote
            .as_ref()
            .map(|r| r.api_url.as_str())
            .unwrap_or(crate::remote::GITHUB_API_URL);
        GitHubClient::new(api_url, self.session.get_token())
            .context("Failed to create GitHub client")
    }

    pub fn export_backup(&self, password: &str) -> Result<EncryptedBlob> {
        backup::export_ledger(&self.ledger, &self.cipher(), password)
            .context("Failed to export ledger")
    }

    pub fn import_backup(&mut self, blob: &EncryptedBlob, password: &str) -> Result<usize> {
        let cipher = self.cipher();
        backup::import_ledger(&mut self.ledger, &cipher, blob, password)
            .context("Failed to import ledger")
    }

    /// Export the ledger and commit it to the configured remote
    pub fn push_backup(&self, remote: &dyn RemoteContent, password: &str) -> Result<CommitResult> {
        let target = self
            .remote_target()
            .context("No remote configured (set remote.owner and remote.repo)")?;
        let blob = self.export_backup(password)?;
        backup::push_backup(remote, &target, &blob).context("Failed to push backup")
    }

    /// Fetch the remote backup and import it; `None` if there is none
    pub fn pull_backup(
        &mut self,
        remote: &dyn RemoteContent,
        password: &str,
    ) -> Result<Option<usize>> {
        let target = self
            .remote_target()
            .context("No remote configured (set remote.owner and remote.repo)")?;
        let Some(blob) = backup::pull_backup(remote, &target).context("Failed to pull backup")?
        else {
            return Ok(None);
        };
        self.import_backup(&blob, password).map(Some)
    }

    // ==================== Status ====================

    pub fn stats(&self) -> Result<StoreStats> {
        let prefix = format!("{}_", self.config.model_prefix);
        let collections = self
            .storage
            .keys()
            .context("Failed to list storage keys")?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();

        let tokens = self.ledger.get_all();
        let current_user = self.ledger.current_user_id();

        Ok(StoreStats {
            backend: self.config.backend,
            ledger_key: self.ledger.storage_key().to_string(),
            token_count: tokens.len(),
            active_tokens: tokens.iter().filter(|t| t.is_active()).count(),
            current_balance: self.ledger.get_balance(&current_user),
            current_user,
            collections,
        })
    }
}
