//! Storage error handling
//!
//! Provides typed errors for key-value backends with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in a key-value backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create storage directory
    #[error("Failed to create storage directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// In-memory quota would be exceeded by a write
    #[error("Storage quota exceeded writing '{key}': {used} of {quota} bytes in use, {requested} requested")]
    QuotaExceeded {
        key: String,
        quota: usize,
        used: usize,
        requested: usize,
    },

    /// Disk is full
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Key cannot be mapped onto the backend
    #[error("Invalid storage key '{0}': only ASCII letters, digits, '_', '-' and '.' are allowed")]
    InvalidKey(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Whether the write was rejected for lack of space
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            StorageError::QuotaExceeded { .. } | StorageError::DiskFull { .. }
        )
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::QuotaExceeded { .. }
                | StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::QuotaExceeded { .. } => {
                Some("Remove unused collections or clear the ledger, then retry.")
            }
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions on the data directory.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::InvalidKey(_) => {
                Some("Use collection names made of letters, digits, '_', '-' or '.'.")
            }
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
        assert!(err.is_quota());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_io_is_write_error() {
        let io_err = io::Error::new(io::ErrorKind::Other, "device busy");
        let err = StorageError::from_io(io_err, PathBuf::from("/busy"));

        assert!(matches!(err, StorageError::WriteError { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_quota_exceeded_display() {
        let err = StorageError::QuotaExceeded {
            key: "pewpi_tokens".to_string(),
            quota: 100,
            used: 90,
            requested: 20,
        };

        let msg = err.to_string();
        assert!(msg.contains("quota exceeded"));
        assert!(msg.contains("pewpi_tokens"));
        assert!(err.is_quota());
    }

    #[test]
    fn test_invalid_key_suggestion() {
        let err = StorageError::InvalidKey("../escape".to_string());
        assert!(err.to_string().contains("../escape"));
        assert!(err.recovery_suggestion().is_some());
    }
}
