//! Token records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Record;

/// Prefix of every generated token ID
pub const TOKEN_ID_PREFIX: &str = "token_";

/// Token tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl TokenType {
    pub const ALL: [TokenType; 4] = [
        TokenType::Bronze,
        TokenType::Silver,
        TokenType::Gold,
        TokenType::Platinum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Bronze => "bronze",
            TokenType::Silver => "silver",
            TokenType::Gold => "gold",
            TokenType::Platinum => "platinum",
        }
    }

    /// Value minted when none is given
    pub fn nominal_value(&self) -> f64 {
        match self {
            TokenType::Bronze => 1.0,
            TokenType::Silver => 5.0,
            TokenType::Gold => 10.0,
            TokenType::Platinum => 50.0,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown token type '{s}'"))
    }
}

/// Lifecycle state of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Spent,
    Revoked,
}

impl TokenStatus {
    pub const ALL: [TokenStatus; 3] = [TokenStatus::Active, TokenStatus::Spent, TokenStatus::Revoked];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Spent => "spent",
            TokenStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub token_id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub value: f64,
    pub user_id: String,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }
}

impl TryFrom<&Record> for Token {
    type Error = serde_json::Error;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        serde_json::from_value(record.to_value())
    }
}

/// Request to mint a token
#[derive(Debug, Clone, PartialEq)]
pub struct NewToken {
    pub token_type: TokenType,
    /// Defaults to the type's nominal value
    pub value: Option<f64>,
    /// Defaults to the ledger's current user
    pub user_id: Option<String>,
}

impl NewToken {
    pub fn new(token_type: TokenType) -> Self {
        Self {
            token_type,
            value: None,
            user_id: None,
        }
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Generate a token ID: `token_<millis>_<random>`
pub fn generate_token_id() -> String {
    let random = bs58::encode(&Uuid::new_v4().as_bytes()[..10]).into_string();
    format!(
        "{TOKEN_ID_PREFIX}{}_{random}",
        Utc::now().timestamp_millis()
    )
}
