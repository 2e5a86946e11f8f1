//! Session token with cross-session broadcast
//!
//! Each session keeps its remote-API token in its own key-value store
//! under `gh.token`. Setting or clearing the token also posts
//! `{"token": ...}` on the `pewpi-token` channel of a shared
//! `BroadcastHub`; peers adopt it when they call `apply_broadcasts`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, StorageError};

/// Storage key holding the session token
pub const TOKEN_KEY: &str = "gh.token";

/// Channel token changes are posted on
pub const TOKEN_CHANNEL: &str = "pewpi-token";

/// Messages kept per channel for slow receivers
const CHANNEL_CAPACITY: usize = 64;

/// In-process named broadcast channels
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Value>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Value>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Value> {
        self.lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Post `payload` to every current receiver of `channel`
    ///
    /// Returns how many receivers it reached; posting to a channel nobody
    /// listens on is not an error.
    pub fn post(&self, channel: &str, payload: Value) -> usize {
        self.sender(channel).send(payload).unwrap_or(0)
    }

    /// Receive every message posted to `channel` from now on
    pub fn on_message(&self, channel: &str) -> broadcast::Receiver<Value> {
        self.sender(channel).subscribe()
    }
}

/// A session's token slot
pub struct Session {
    storage: Arc<dyn KeyValueStore>,
    hub: BroadcastHub,
    inbox: broadcast::Receiver<Value>,
}

impl Session {
    pub fn new(storage: Arc<dyn KeyValueStore>, hub: BroadcastHub) -> Self {
        let inbox = hub.on_message(TOKEN_CHANNEL);
        Self {
            storage,
            hub,
            inbox,
        }
    }

    pub fn get_token(&self) -> Option<String> {
        match self.storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                None
            }
        }
    }

    /// Store the token and tell peers
    pub fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(TOKEN_KEY, token)?;
        self.hub.post(TOKEN_CHANNEL, json!({ "token": token }));
        Ok(())
    }

    /// Forget the token and tell peers
    pub fn clear_token(&self) -> Result<(), StorageError> {
        self.storage.remove(TOKEN_KEY)?;
        self.hub.post(TOKEN_CHANNEL, json!({ "token": null }));
        Ok(())
    }

    /// Adopt token changes posted since the last call
    ///
    /// Returns how many messages were applied. Only the stored token is
    /// changed; nothing is re-broadcast.
    pub fn apply_broadcasts(&mut self) -> Result<usize, StorageError> {
        let mut applied = 0;
        loop {
            let message = match self.inbox.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session missed token broadcasts");
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            };

            match message.get("token") {
                Some(Value::String(token)) => self.storage.set(TOKEN_KEY, token)?,
                Some(Value::Null) => self.storage.remove(TOKEN_KEY)?,
                _ => {
                    debug!(%message, "Ignoring malformed token broadcast");
                    continue;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }
}
