//! Token ledger
//!
//! A document collection of tokens (`<prefix>_tokens`) with balance
//! aggregation and synchronous change notifications.
//!
//! ## Events
//!
//! - `tokenCreated`: after a token is minted and persisted, payload is the record
//! - `tokenUpdated`: after a spend or revoke, payload is the record
//! - `tokensCleared`: after the ledger is emptied
//!
//! Handlers run on the caller's thread before the mutating call returns.
//! They receive shared references only, so they cannot mutate the ledger
//! that is notifying them.

pub mod events;
pub mod token;

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::collection::Collection;
use crate::error::{ModelError, PersistenceError};
use crate::models::{Query, Record};
use crate::schema::{FieldSpec, Schema};
use crate::storage::{storage_key, KeyValueStore, StorageError};

pub use events::{Event, EventBus, Subscription, TOKENS_CLEARED, TOKEN_CREATED, TOKEN_UPDATED, WILDCARD};
pub use token::{generate_token_id, NewToken, Token, TokenStatus, TokenType};

/// Collection name of the ledger under its prefix
pub const LEDGER_COLLECTION: &str = "tokens";

/// User ID used when none has been set
pub const ANONYMOUS_USER: &str = "anonymous";

/// Errors raised by ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Only active tokens can be spent or revoked
    #[error("Token {token_id} is {status}, expected active")]
    NotActive {
        token_id: String,
        status: TokenStatus,
    },

    #[error("Stored token {id} is malformed: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Schema every ledger record must satisfy
pub fn token_schema() -> Schema {
    Schema::new()
        .field("tokenId", FieldSpec::text().required().min_length(1))
        .field(
            "type",
            FieldSpec::text()
                .required()
                .one_of(TokenType::ALL.iter().map(TokenType::as_str)),
        )
        .field("value", FieldSpec::number().required().min(0.0))
        .field("userId", FieldSpec::text().required().min_length(1))
        .field(
            "status",
            FieldSpec::text()
                .one_of(TokenStatus::ALL.iter().map(TokenStatus::as_str))
                .default_value(TokenStatus::Active.as_str()),
        )
}

/// Token ledger bound to one storage backend
pub struct Ledger {
    tokens: Collection,
    events: EventBus,
    storage: Arc<dyn KeyValueStore>,
    user_key: String,
}

impl Ledger {
    /// Open the ledger stored under `<prefix>_tokens`
    pub fn open(storage: Arc<dyn KeyValueStore>, prefix: &str) -> Self {
        let tokens = Collection::open(token_schema(), LEDGER_COLLECTION, storage.clone(), prefix);
        Self {
            tokens,
            events: EventBus::new(),
            storage,
            user_key: storage_key(prefix, "user_id"),
        }
    }

    /// Storage key of the token collection
    pub fn storage_key(&self) -> &str {
        self.tokens.storage_key()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    // ==================== Current user ====================

    /// The user new tokens are minted for by default
    pub fn current_user_id(&self) -> String {
        match self.storage.get(&self.user_key) {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => ANONYMOUS_USER.to_string(),
            Err(e) => {
                warn!(key = %self.user_key, error = %e, "Failed to read current user");
                ANONYMOUS_USER.to_string()
            }
        }
    }

    pub fn set_current_user_id(&self, user_id: &str) -> Result<(), LedgerError> {
        self.storage.set(&self.user_key, user_id)?;
        Ok(())
    }

    // ==================== Mutations ====================

    /// Mint and persist a token, then notify `tokenCreated`
    pub fn create_token(&mut self, new: NewToken) -> Result<Token, LedgerError> {
        let value = new.value.unwrap_or_else(|| new.token_type.nominal_value());
        let user_id = match new.user_id {
            Some(user_id) => user_id,
            None => self.current_user_id(),
        };

        let record = self.tokens.create(json!({
            "tokenId": generate_token_id(),
            "type": new.token_type,
            "value": value,
            "userId": user_id,
            "status": TokenStatus::Active,
        }))?;
        let token = decode(&record)?;

        info!(token_id = %token.token_id, user_id = %token.user_id, value, "Minted token");
        self.notify_listeners(TOKEN_CREATED, record.to_value());
        Ok(token)
    }

    /// Mark an active token spent
    ///
    /// Returns `None` if no token has that ID.
    pub fn spend(&mut self, token_id: &str) -> Result<Option<Token>, LedgerError> {
        self.transition(token_id, TokenStatus::Spent)
    }

    /// Mark an active token revoked
    pub fn revoke(&mut self, token_id: &str) -> Result<Option<Token>, LedgerError> {
        self.transition(token_id, TokenStatus::Revoked)
    }

    fn transition(
        &mut self,
        token_id: &str,
        status: TokenStatus,
    ) -> Result<Option<Token>, LedgerError> {
        let query = Query::all().eq("tokenId", token_id);
        let Some(record) = self.tokens.find_one(&query) else {
            return Ok(None);
        };
        let current = decode(&record)?;
        if !current.is_active() {
            return Err(LedgerError::NotActive {
                token_id: token_id.to_string(),
                status: current.status,
            });
        }

        let Some(record) = self
            .tokens
            .update_one(&Query::by_id(record.id), json!({ "status": status }))?
        else {
            return Ok(None);
        };
        let token = decode(&record)?;

        info!(token_id, status = %status, "Updated token");
        self.notify_listeners(TOKEN_UPDATED, record.to_value());
        Ok(Some(token))
    }

    /// Remove every token, then notify `tokensCleared`
    pub fn clear_all(&mut self) -> Result<(), LedgerError> {
        self.tokens.clear_all()?;
        self.notify_listeners(TOKENS_CLEARED, json!({}));
        Ok(())
    }

    /// Replace the ledger with exported records
    pub fn restore(&mut self, records: Vec<Record>) -> Result<usize, LedgerError> {
        Ok(self.tokens.restore(records)?)
    }

    /// Raw records, for export
    pub fn records(&self) -> Vec<Record> {
        self.tokens.find_all()
    }

    /// Re-read the ledger from storage
    pub fn reload(&mut self) {
        self.tokens.reload();
    }

    // ==================== Queries ====================

    pub fn get_all(&self) -> Vec<Token> {
        decode_all(self.tokens.find_all())
    }

    pub fn get_by_token_id(&self, token_id: &str) -> Option<Token> {
        self.tokens
            .find_one(&Query::all().eq("tokenId", token_id))
            .and_then(|record| decode(&record).ok())
    }

    pub fn get_by_user_id(&self, user_id: &str) -> Vec<Token> {
        decode_all(self.tokens.find(&Query::all().eq("userId", user_id)))
    }

    /// Sum of the values of the user's active tokens
    pub fn get_balance(&self, user_id: &str) -> f64 {
        self.get_by_user_id(user_id)
            .iter()
            .filter(|t| t.is_active())
            .map(|t| t.value)
            .sum()
    }

    // ==================== Notifications ====================

    /// Register a handler for `event_type`, or `"*"` for every event
    pub fn subscribe<F>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(event_type, handler)
    }

    /// Run the handlers for `event_type` and the wildcard handlers
    pub fn notify_listeners(&self, event_type: &str, payload: Value) -> usize {
        self.events.notify(event_type, payload)
    }

    /// Shared handle to the ledger's event bus
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }
}

fn decode(record: &Record) -> Result<Token, LedgerError> {
    Token::try_from(record).map_err(|source| LedgerError::Malformed {
        id: record.id.clone(),
        source,
    })
}

/// Decode records, skipping any that are not valid tokens
fn decode_all(records: Vec<Record>) -> Vec<Token> {
    records
        .iter()
        .filter_map(|record| match Token::try_from(record) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(id = %record.id, error = %e, "Skipping malformed token record");
                None
            }
        })
        .collect()
}
