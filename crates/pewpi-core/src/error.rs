//! Errors raised by collections
//!
//! "Not found" is never an error: lookups return `None`, empty vectors or
//! zero counts. Only schema violations and failed writes surface here.

use thiserror::Error;

use crate::storage::StorageError;

/// A candidate document violated its schema
///
/// Carries every violated rule. Nothing was written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }

    /// Whether any message mentions `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.errors.iter().any(|e| e.contains(needle))
    }
}

/// A schema definition could not be loaded
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    Parse(#[from] toml::de::Error),

    /// A declared default breaks its own field's rules
    #[error("Invalid default: {}", .0.errors.join("; "))]
    InvalidDefault(#[from] ValidationError),
}

/// A collection could not be written to its backend
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The backend rejected the write
    #[error("Failed to persist '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The records could not be serialized
    #[error("Failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    /// Storage key of the collection that failed to persist
    pub fn key(&self) -> &str {
        match self {
            PersistenceError::Write { key, .. } | PersistenceError::Serialize { key, .. } => key,
        }
    }

    /// Whether the backend ran out of space
    pub fn is_quota(&self) -> bool {
        matches!(self, PersistenceError::Write { source, .. } if source.is_quota())
    }
}

/// Any failure of a mutating collection operation
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ModelError {
    /// The validation failure, if that is what this is
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            ModelError::Validation(e) => Some(e),
            ModelError::Persistence(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_joins_messages() {
        let err = ValidationError::new(vec![
            "name is required".to_string(),
            "age must be at most 150".to_string(),
        ]);

        let msg = err.to_string();
        assert!(msg.contains("name is required"));
        assert!(msg.contains("age must be at most 150"));
        assert!(err.mentions("age"));
        assert!(!err.mentions("email"));
    }

    #[test]
    fn test_persistence_error_quota() {
        let err = PersistenceError::Write {
            key: "pewpi_tokens".to_string(),
            source: StorageError::QuotaExceeded {
                key: "pewpi_tokens".to_string(),
                quota: 1,
                used: 0,
                requested: 2,
            },
        };

        assert!(err.is_quota());
        assert_eq!(err.key(), "pewpi_tokens");
        assert!(err.to_string().contains("pewpi_tokens"));
    }

    #[test]
    fn test_model_error_from_validation() {
        let err: ModelError = ValidationError::new(vec!["x is required".into()]).into();
        assert!(err.as_validation().is_some());
        assert!(err.to_string().contains("x is required"));
    }
}
