//! # Backup Cipher
//!
//! Passphrase encryption of identity exports.
//!
//! ## Blob format
//!
//! ```text
//! base64( salt[16] || iv[12] || ciphertext || tag[16] )
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256(passphrase, salt, 65 536 rounds) truncated
//! to 256 bits; the cipher is AES-256-GCM. Salt and IV are fresh on every
//! call, so encrypting the same export twice under the same passphrase
//! gives unrelated blobs.
//!
//! Both directions are CPU-bound (the KDF dominates). From async code run
//! them under `spawn_blocking`, as [`super::BackupService`] does.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::{AES_NONCE_LENGTH, AES_TAG_LENGTH, KDF_SALT_LENGTH};
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::kdf;

pub use crate::crypto::content_hash;

/// Shortest blob that can possibly decrypt (empty plaintext).
const MIN_BLOB_LENGTH: usize = KDF_SALT_LENGTH + AES_NONCE_LENGTH + AES_TAG_LENGTH;

/// Encrypt `plaintext` under `passphrase` into a transportable blob.
///
/// ```
/// use anchor_core::backup::cipher;
///
/// let blob = cipher::encrypt(b"{}", "correct horse").unwrap();
/// assert_eq!(cipher::decrypt(&blob, "correct horse").unwrap(), b"{}");
/// ```
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<String, EncryptionError> {
    let salt = kdf::generate_salt();
    let key = kdf::derive_key(passphrase, &salt);
    let sealed = encryption::encrypt(&key, plaintext)?;

    let mut blob = Vec::with_capacity(KDF_SALT_LENGTH + sealed.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&sealed);
    Ok(STANDARD.encode(blob))
}

/// Decrypt a blob from [`encrypt`].
///
/// A wrong passphrase and a tampered blob both fail with
/// [`EncryptionError::DecryptFailed`]. Broken framing fails earlier with
/// `InvalidEncoding` or `BlobTooShort`.
pub fn decrypt(blob: &str, passphrase: &str) -> Result<Vec<u8>, EncryptionError> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|_| EncryptionError::InvalidEncoding)?;
    if bytes.len() < MIN_BLOB_LENGTH {
        return Err(EncryptionError::BlobTooShort);
    }

    let (salt, sealed) = bytes.split_at(KDF_SALT_LENGTH);
    let key = kdf::derive_key(passphrase, salt);
    encryption::decrypt(&key, sealed)
}
