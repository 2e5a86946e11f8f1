//! Encrypted ledger backup
//!
//! The ledger's records are exported as an encrypted blob (see
//! `crypto`), which can be written to a file or committed to a remote
//! repository, and later imported back in place of the current ledger.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::crypto::{Cipher, CryptoError, EncryptedBlob};
use crate::ledger::{Ledger, LedgerError};
use crate::models::Record;
use crate::remote::{CommitResult, PutFile, RemoteContent, RemoteError};

/// Export payload version
pub const EXPORT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Unsupported export version {0}")]
    UnsupportedVersion(u32),

    #[error("Remote backup is not a valid blob: {0}")]
    InvalidRemote(String),
}

/// Plaintext inside an encrypted ledger backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<Record>,
}

/// Where remote backups live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

/// Encrypt the whole ledger under `password`
pub fn export_ledger(
    ledger: &Ledger,
    cipher: &Cipher,
    password: &str,
) -> Result<EncryptedBlob, BackupError> {
    let export = LedgerExport {
        version: EXPORT_VERSION,
        exported_at: Utc::now(),
        records: ledger.records(),
    };
    let blob = cipher.encrypt_object(&export, password)?;
    info!(count = export.records.len(), "Exported ledger");
    Ok(blob)
}

/// Replace the ledger with the contents of a backup
///
/// Nothing changes if the password is wrong or the records are invalid.
pub fn import_ledger(
    ledger: &mut Ledger,
    cipher: &Cipher,
    blob: &EncryptedBlob,
    password: &str,
) -> Result<usize, BackupError> {
    let export: LedgerExport = cipher.decrypt_object(blob, password)?;
    if export.version != EXPORT_VERSION {
        return Err(BackupError::UnsupportedVersion(export.version));
    }
    let count = ledger.restore(export.records)?;
    info!(count, exported_at = %export.exported_at, "Imported ledger");
    Ok(count)
}

/// Commit a backup blob, replacing any previous one
pub fn push_backup(
    remote: &dyn RemoteContent,
    target: &RemoteTarget,
    blob: &EncryptedBlob,
) -> Result<CommitResult, BackupError> {
    let existing = remote.get_file(&target.owner, &target.repo, &target.path, &target.branch)?;
    let content = STANDARD.encode(blob.to_json()?);
    let message = format!("Update ledger backup {}", blob.created_at.to_rfc3339());

    let result = remote.put_file(&PutFile {
        owner: &target.owner,
        repo: &target.repo,
        path: &target.path,
        branch: &target.branch,
        message: &message,
        content: &content,
        sha: existing.sha.as_deref(),
    })?;
    info!(repo = %target.repo, path = %target.path, replaced = existing.exists, "Pushed backup");
    Ok(result)
}

/// Fetch the remote backup blob, if there is one
pub fn pull_backup(
    remote: &dyn RemoteContent,
    target: &RemoteTarget,
) -> Result<Option<EncryptedBlob>, BackupError> {
    let info = remote.get_file(&target.owner, &target.repo, &target.path, &target.branch)?;
    let Some(bytes) = info.decoded_content()? else {
        return Ok(None);
    };
    let text = String::from_utf8(bytes).map_err(|e| BackupError::InvalidRemote(e.to_string()))?;
    let blob =
        EncryptedBlob::from_json(&text).map_err(|e| BackupError::InvalidRemote(e.to_string()))?;
    Ok(Some(blob))
}
