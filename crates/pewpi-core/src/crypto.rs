//! Password-based encryption helpers
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 and data is sealed with
//! ChaCha20-Poly1305. Every encryption draws a fresh salt and nonce, and
//! the result is a self-describing JSON blob:
//!
//! ```json
//! { "v": 1, "salt": "...", "iv": "...", "ct": "...", "iter": 250000, "created_at": "..." }
//! ```
//!
//! Binary fields are standard base64. The iteration count travels with
//! the blob so it can be decrypted after the default changes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

/// PBKDF2 rounds used unless configured otherwise
pub const DEFAULT_ITERATIONS: u32 = 250_000;

/// Upper bound on PBKDF2 rounds, for encryption and for blobs being opened
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Blob format version
pub const BLOB_VERSION: u32 = 1;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

/// Salt for `derive_key`, which must be deterministic
const DERIVE_KEY_SALT: &[u8] = b"pewpi.derive-key.v1";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    Encrypt,

    /// Wrong password or tampered ciphertext
    #[error("Decryption failed: wrong password or corrupted data")]
    Decrypt,

    #[error("Unsupported blob version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid blob: {0}")]
    InvalidBlob(String),

    #[error("Invalid base64 in '{field}': {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Decrypted data is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encrypted payload with everything needed to decrypt it except the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub v: u32,
    pub salt: String,
    pub iv: String,
    pub ct: String,
    pub iter: u32,
    pub created_at: DateTime<Utc>,
}

impl EncryptedBlob {
    pub fn to_json(&self) -> Result<String, CryptoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self, CryptoError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Encryption with a fixed PBKDF2 work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cipher {
    iterations: u32,
}

impl Default for Cipher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl Cipher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.clamp(1, MAX_ITERATIONS),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Deterministic hex key for `password`
    pub fn derive_key(&self, password: &str) -> String {
        hex::encode(stretch(password, DERIVE_KEY_SALT, self.iterations))
    }

    /// Seal `plaintext` under `password`
    pub fn encrypt(&self, plaintext: &str, password: &str) -> Result<EncryptedBlob, CryptoError> {
        let salt = Uuid::new_v4();
        let nonce_source = Uuid::new_v4();
        let nonce_bytes = &nonce_source.as_bytes()[..NONCE_LEN];

        let key = stretch(password, salt.as_bytes(), self.iterations);
        let aead = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::Encrypt)?;
        let ciphertext = aead
            .encrypt(Nonce::from_slice(nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(EncryptedBlob {
            v: BLOB_VERSION,
            salt: STANDARD.encode(salt.as_bytes()),
            iv: STANDARD.encode(nonce_bytes),
            ct: STANDARD.encode(ciphertext),
            iter: self.iterations,
            created_at: Utc::now(),
        })
    }

    /// Open a blob sealed by `encrypt`
    ///
    /// Uses the blob's own iteration count, which must be within
    /// `1..=MAX_ITERATIONS`; the bound is checked before any key derivation.
    pub fn decrypt(&self, blob: &EncryptedBlob, password: &str) -> Result<String, CryptoError> {
        if blob.v != BLOB_VERSION {
            return Err(CryptoError::UnsupportedVersion(blob.v));
        }
        if blob.iter == 0 {
            return Err(CryptoError::InvalidBlob("iteration count is zero".into()));
        }
        if blob.iter > MAX_ITERATIONS {
            return Err(CryptoError::InvalidBlob(format!(
                "iteration count {} exceeds {MAX_ITERATIONS}",
                blob.iter
            )));
        }

        let salt = decode_field("salt", &blob.salt)?;
        if salt.len() != SALT_LEN {
            return Err(CryptoError::InvalidBlob(format!(
                "salt must be {SALT_LEN} bytes"
            )));
        }
        let nonce = decode_field("iv", &blob.iv)?;
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidBlob(format!(
                "iv must be {NONCE_LEN} bytes"
            )));
        }
        let ciphertext = decode_field("ct", &blob.ct)?;

        let key = stretch(password, &salt, blob.iter);
        let aead = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::Decrypt)?;
        let plaintext = aead
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| CryptoError::Decrypt)?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Serialize `value` to JSON and seal it
    pub fn encrypt_object<T: Serialize>(
        &self,
        value: &T,
        password: &str,
    ) -> Result<EncryptedBlob, CryptoError> {
        let json = serde_json::to_string(value)?;
        self.encrypt(&json, password)
    }

    /// Open a blob and deserialize its JSON content
    pub fn decrypt_object<T: DeserializeOwned>(
        &self,
        blob: &EncryptedBlob,
        password: &str,
    ) -> Result<T, CryptoError> {
        let json = self.decrypt(blob, password)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// `Cipher::default().derive_key`
pub fn derive_key(password: &str) -> String {
    Cipher::default().derive_key(password)
}

/// `Cipher::default().encrypt`
pub fn encrypt(plaintext: &str, password: &str) -> Result<EncryptedBlob, CryptoError> {
    Cipher::default().encrypt(plaintext, password)
}

/// `Cipher::default().decrypt`
pub fn decrypt(blob: &EncryptedBlob, password: &str) -> Result<String, CryptoError> {
    Cipher::default().decrypt(blob, password)
}

fn stretch(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|source| CryptoError::Encoding { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Keep tests fast
    fn cipher() -> Cipher {
        Cipher::new(1000)
    }

    #[test]
    fn test_roundtrip() {
        let cipher = cipher();
        let long = "x".repeat(10_000);
        for text in ["", "hello", "ünïcödé ✓", long.as_str()] {
            let blob = cipher.encrypt(text, "hunter2").unwrap();
            assert_eq!(cipher.decrypt(&blob, "hunter2").unwrap(), text);
        }
    }

    #[test]
    fn test_wrong_password_fails() {
        let cipher = cipher();
        let blob = cipher.encrypt("secret", "right").unwrap();
        assert!(matches!(
            cipher.decrypt(&blob, "wrong"),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_encryption() {
        let cipher = cipher();
        let a = cipher.encrypt("same", "pw").unwrap();
        let b = cipher.encrypt("same", "pw").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ct, b.ct);
    }

    #[test]
    fn test_blob_carries_iterations() {
        let blob = Cipher::new(1200).encrypt("data", "pw").unwrap();
        assert_eq!(blob.v, BLOB_VERSION);
        assert_eq!(blob.iter, 1200);

        // A cipher with a different work factor still opens it
        assert_eq!(Cipher::new(5).decrypt(&blob, "pw").unwrap(), "data");
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = cipher();
        let mut blob = cipher.encrypt("payload", "pw").unwrap();
        let mut bytes = STANDARD.decode(&blob.ct).unwrap();
        bytes[0] ^= 0xff;
        blob.ct = STANDARD.encode(bytes);

        assert!(matches!(cipher.decrypt(&blob, "pw"), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn test_invalid_blobs() {
        let cipher = cipher();
        let blob = cipher.encrypt("payload", "pw").unwrap();

        let mut bad = blob.clone();
        bad.v = 2;
        assert!(matches!(
            cipher.decrypt(&bad, "pw"),
            Err(CryptoError::UnsupportedVersion(2))
        ));

        let mut bad = blob.clone();
        bad.iv = "not base64!".into();
        assert!(matches!(
            cipher.decrypt(&bad, "pw"),
            Err(CryptoError::Encoding { field: "iv", .. })
        ));

        let mut bad = blob;
        bad.salt = STANDARD.encode([0u8; 4]);
        assert!(matches!(
            cipher.decrypt(&bad, "pw"),
            Err(CryptoError::InvalidBlob(_))
        ));
    }

    #[test]
    fn test_blob_json_roundtrip() {
        let cipher = cipher();
        let blob = cipher.encrypt("payload", "pw").unwrap();
        let json = blob.to_json().unwrap();

        let raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        for field in ["v", "salt", "iv", "ct", "iter", "created_at"] {
            assert!(raw.get(field).is_some(), "missing {field}");
        }

        let parsed = EncryptedBlob::from_json(&json).unwrap();
        assert_eq!(cipher.decrypt(&parsed, "pw").unwrap(), "payload");
    }

    #[test]
    fn test_derive_key_deterministic_and_distinct() {
        let cipher = cipher();
        let a = cipher.derive_key("password");
        assert_eq!(a, cipher.derive_key("password"));
        assert_eq!(a.len(), KEY_LEN * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, cipher.derive_key("password1"));
        assert_ne!(a, Cipher::new(2000).derive_key("password"));
    }

    #[test]
    fn test_object_roundtrip() {
        let cipher = cipher();
        let value = json!({"tokens": [{"tokenId": "token_1", "value": 5}]});
        let blob = cipher.encrypt_object(&value, "pw").unwrap();

        let back: serde_json::Value = cipher.decrypt_object(&blob, "pw").unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_iterations_clamped() {
        assert_eq!(Cipher::new(0).iterations(), 1);
        assert_eq!(Cipher::new(u32::MAX).iterations(), MAX_ITERATIONS);
    }

    #[test]
    fn test_oversized_iteration_count_refused() {
        let cipher = cipher();
        let mut blob = cipher.encrypt("payload", "pw").unwrap();

        // Would take minutes to derive if it were not rejected up front
        blob.iter = u32::MAX;
        let started = std::time::Instant::now();
        let err = cipher.decrypt(&blob, "pw").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidBlob(_)));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        blob.iter = MAX_ITERATIONS + 1;
        assert!(matches!(
            cipher.decrypt(&blob, "pw"),
            Err(CryptoError::InvalidBlob(_))
        ));
    }
}
