//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for Anchor backups. One AEAD call both hides the
//! export and detects any tampering with it, so a wrong passphrase and a
//! flipped bit fail the same way: the tag doesn't verify and nothing comes
//! back.
//!
//! ## Nonce management
//!
//! GCM is unforgiving about nonce reuse under one key. Every call here draws
//! a fresh 96-bit nonce from the OS CSPRNG. Backup keys are also derived
//! with a fresh salt per export (see [`super::kdf`]), so a key is in practice
//! never used twice.
//!
//! ## Wire format
//!
//! [`encrypt`] returns `nonce || ciphertext || tag` as a single `Vec<u8>`.
//! [`decrypt`] expects the same layout.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Errors from the symmetric layer.
///
/// Kept vague. "Wrong key" and "corrupted ciphertext" are the same error.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("blob is not valid transport encoding")]
    InvalidEncoding,

    #[error("blob too short to hold salt, nonce and tag")]
    BlobTooShort,
}

/// Encrypt `plaintext` under `key` with a random nonce.
///
/// # Example
///
/// ```
/// use anchor_core::crypto::encryption::{decrypt, encrypt};
///
/// let key = [0x42u8; 32];
/// let sealed = encrypt(&key, b"identity export").unwrap();
/// assert_eq!(decrypt(&key, &sealed).unwrap(), b"identity export");
/// ```
pub fn encrypt(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `nonce || ciphertext || tag` produced by [`encrypt`].
///
/// Returns the full plaintext or an error. There is no partial output.
pub fn decrypt(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH + AES_TAG_LENGTH {
        return Err(EncryptionError::BlobTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; AES_KEY_LENGTH] {
        let mut key = [0u8; AES_KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = br#"{"did":"did:anchor:abc"}"#;

        let sealed = encrypt(&key, plaintext).unwrap();
        assert_eq!(sealed.len(), AES_NONCE_LENGTH + plaintext.len() + AES_TAG_LENGTH);
        assert_eq!(decrypt(&key, &sealed).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let sealed = encrypt(&key, b"").unwrap();
        assert!(decrypt(&key, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&test_key(), b"secret").unwrap();
        assert!(matches!(
            decrypt(&test_key(), &sealed),
            Err(EncryptionError::DecryptFailed)
        ));
    }

    #[test]
    fn test_every_flipped_byte_is_detected() {
        let key = test_key();
        let sealed = encrypt(&key, b"tamper me").unwrap();
        for i in 0..sealed.len() {
            let mut corrupted = sealed.clone();
            corrupted[i] ^= 0x01;
            assert!(decrypt(&key, &corrupted).is_err(), "flip at {i} went unnoticed");
        }
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = test_key();
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a[..AES_NONCE_LENGTH], b[..AES_NONCE_LENGTH]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_input_rejected() {
        let key = test_key();
        let short = [0u8; AES_NONCE_LENGTH + AES_TAG_LENGTH - 1];
        assert!(matches!(
            decrypt(&key, &short),
            Err(EncryptionError::BlobTooShort)
        ));
    }
}
