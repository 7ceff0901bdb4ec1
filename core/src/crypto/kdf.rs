//! Passphrase key derivation: PBKDF2-HMAC-SHA256.
//!
//! The iteration count is fixed in [`crate::config::KDF_ITERATIONS`] and is
//! not written into the blob, so it cannot change without breaking every
//! existing backup.

use rand::RngCore;
use sha2::Sha256;

use crate::config::{AES_KEY_LENGTH, KDF_ITERATIONS, KDF_SALT_LENGTH};

/// Fresh random salt for one encryption.
pub fn generate_salt() -> [u8; KDF_SALT_LENGTH] {
    let mut salt = [0u8; KDF_SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit AES key from `passphrase` and `salt`.
///
/// CPU-bound (tens of milliseconds). Async callers run it on a blocking
/// thread.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, KDF_ITERATIONS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [7u8; KDF_SALT_LENGTH];
        assert_eq!(derive_key("hunter2", &salt), derive_key("hunter2", &salt));
    }

    #[test]
    fn test_salt_changes_key() {
        assert_ne!(
            derive_key("hunter2", &[1u8; KDF_SALT_LENGTH]),
            derive_key("hunter2", &[2u8; KDF_SALT_LENGTH])
        );
    }

    #[test]
    fn test_passphrase_changes_key() {
        let salt = generate_salt();
        assert_ne!(derive_key("a", &salt), derive_key("b", &salt));
    }

    #[test]
    fn test_salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
