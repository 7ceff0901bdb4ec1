//! # Hashing Utilities
//!
//! SHA-256 is the only hash in Anchor. It serves two jobs:
//!
//! - **Identifier digests**: contact identifiers (emails, phone numbers)
//!   are stored and looked up by their digest, never in plaintext.
//! - **Content hashes**: the integrity hash returned alongside every
//!   backup blob.
//!
//! ## Identifier digests are unsalted
//!
//! [`hash_identifier`] is deterministic on purpose: the same identifier must
//! map to the same digest so `check_identity` is a single key lookup. The
//! price is that anyone holding the contacts table can run a dictionary of
//! emails or phone numbers against it offline. This is a known, accepted
//! risk for now. Salting it changes every stored digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::HASH_OUTPUT_LENGTH;

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use anchor_core::crypto::sha256;
///
/// let hash = sha256(b"anchor");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; HASH_OUTPUT_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 rendered as 64 lowercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Content-integrity hash for a transportable blob.
///
/// Hashes the blob's text form (the base64 string), not the decoded bytes,
/// so a client can check it without decoding anything.
pub fn content_hash(blob: &str) -> String {
    sha256_hex(blob.as_bytes())
}

/// One-way digest of a contact identifier.
///
/// A newtype so a raw identifier can never be passed where a digest is
/// expected (or the other way round).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierDigest(String);

impl IdentifierDigest {
    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentifierDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IdentifierDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentifierDigest({}..)", &self.0[..self.0.len().min(12)])
    }
}

/// Deterministic, unsalted digest of a contact identifier.
///
/// # Example
///
/// ```
/// use anchor_core::crypto::hash_identifier;
///
/// let a = hash_identifier("a@b.com");
/// assert_eq!(a, hash_identifier("a@b.com"));
/// assert_eq!(a.as_str().len(), 64);
/// ```
pub fn hash_identifier(identifier: &str) -> IdentifierDigest {
    IdentifierDigest(sha256_hex(identifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_abc_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn identifier_digest_is_deterministic() {
        assert_eq!(hash_identifier("a@b.com"), hash_identifier("a@b.com"));
    }

    #[test]
    fn identifier_digest_is_case_sensitive() {
        // No normalization happens here; callers normalize first if they want to.
        assert_ne!(hash_identifier("A@b.com"), hash_identifier("a@b.com"));
    }

    #[test]
    fn identifier_digest_hides_plaintext() {
        let digest = hash_identifier("+15551234567");
        assert!(!digest.as_str().contains("5551234567"));
        assert!(!format!("{:?}", digest).contains("5551234567"));
    }

    #[test]
    fn content_hash_covers_text_form() {
        assert_eq!(content_hash("QUJD"), sha256_hex(b"QUJD"));
        assert_ne!(content_hash("QUJD"), sha256_hex(b"ABC"));
    }
}
