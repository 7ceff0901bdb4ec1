//! # Key Management
//!
//! Ed25519 key types for DID controllers.
//!
//! The service never holds a DID's private key. It stores the public key
//! text a client registered and, at proof time, decodes it back into a
//! [`PublicKey`]. Two text forms are accepted:
//!
//! - raw base58btc of the 32 key bytes, and
//! - multibase: `z` followed by base58btc of `0xed 0x01 || key`, the
//!   multicodec form used in `did:key` documents.
//!
//! Anything else (wrong alphabet, wrong length, a different multicodec) is
//! rejected. A key that does not decode to exactly 32 bytes is not an
//! Ed25519 key, whatever else it might be.
//!
//! [`IdentityKeypair`] is the holder side. Clients and tests use it to sign
//! challenges; the service itself only verifies.
//!
//! Key bytes are never logged.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use crate::config::{
    ED25519_MULTICODEC_PREFIX, ED25519_PUBLIC_KEY_LENGTH, ED25519_SIGNATURE_LENGTH,
};

/// Multibase code for base58btc.
const MULTIBASE_BASE58BTC: char = 'z';

/// Errors from decoding key or signature text.
///
/// Deliberately says nothing about the bytes involved.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key encoding")]
    InvalidEncoding,

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unsupported multicodec prefix")]
    UnsupportedMulticodec,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// A validated Ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Decode registered key text (raw base58btc or multibase `z...`).
    pub fn decode(text: &str) -> Result<Self, KeyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KeyError::InvalidEncoding);
        }

        // Raw base58 first. A multibase string never decodes to 32 bytes
        // as a whole: the leading 'z' and the two prefix bytes push it to 35.
        if let Ok(raw) = bs58::decode(text).into_vec() {
            if raw.len() == ED25519_PUBLIC_KEY_LENGTH {
                return Self::try_from_slice(&raw);
            }
        }

        let Some(rest) = text.strip_prefix(MULTIBASE_BASE58BTC) else {
            return Err(Self::length_error(text));
        };
        let decoded = bs58::decode(rest)
            .into_vec()
            .map_err(|_| KeyError::InvalidEncoding)?;
        let Some(key_bytes) = decoded.strip_prefix(&ED25519_MULTICODEC_PREFIX[..]) else {
            return Err(KeyError::UnsupportedMulticodec);
        };
        Self::try_from_slice(key_bytes)
    }

    fn length_error(text: &str) -> KeyError {
        match bs58::decode(text).into_vec() {
            Ok(raw) => KeyError::InvalidLength {
                expected: ED25519_PUBLIC_KEY_LENGTH,
                actual: raw.len(),
            },
            Err(_) => KeyError::InvalidEncoding,
        }
    }

    /// Build from raw bytes, checking length and that they are a curve point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; ED25519_PUBLIC_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidLength {
                expected: ED25519_PUBLIC_KEY_LENGTH,
                actual: slice.len(),
            })?;
        let verifying_key =
            VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    /// Raw 32 bytes.
    pub fn to_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_LENGTH] {
        self.verifying_key.to_bytes()
    }

    /// Raw base58btc text.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }

    /// Multibase text: `z` + base58btc(`0xed 0x01 || key`).
    pub fn to_multibase(&self) -> String {
        let mut prefixed = Vec::with_capacity(ED25519_MULTICODEC_PREFIX.len() + 32);
        prefixed.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
        prefixed.extend_from_slice(&self.to_bytes());
        format!("{MULTIBASE_BASE58BTC}{}", bs58::encode(prefixed).into_string())
    }

    /// Strict Ed25519 verification.
    ///
    /// Rejects small-order keys and non-canonical signatures that the
    /// lenient check lets through.
    pub fn verify_strict(&self, message: &[u8], signature: &DetachedSignature) -> bool {
        self.verifying_key
            .verify_strict(message, &signature.inner)
            .is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

// ---------------------------------------------------------------------------
// DetachedSignature
// ---------------------------------------------------------------------------

/// A 64-byte Ed25519 signature carried separately from its message.
#[derive(Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    inner: DalekSignature,
}

impl DetachedSignature {
    /// Decode standard base64 text. Must be exactly 64 bytes.
    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|_| KeyError::InvalidSignature)?;
        Self::try_from_slice(&bytes)
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; ED25519_SIGNATURE_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self {
            inner: DalekSignature::from_bytes(&bytes),
        })
    }

    pub fn to_bytes(&self) -> [u8; ED25519_SIGNATURE_LENGTH] {
        self.inner.to_bytes()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }
}

impl fmt::Debug for DetachedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.to_bytes());
        write!(f, "DetachedSignature({}...)", &hex[..16])
    }
}

// ---------------------------------------------------------------------------
// IdentityKeypair
// ---------------------------------------------------------------------------

/// Holder-side Ed25519 keypair.
///
/// Intentionally not `Serialize`. Exporting a secret key should be an
/// explicit call, not a side effect of putting a struct in a response.
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

impl IdentityKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Test vectors only.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// Sign `message`. Ed25519 is deterministic, so the same input always
    /// gives the same signature.
    pub fn sign(&self, message: &[u8]) -> DetachedSignature {
        DetachedSignature {
            inner: self.signing_key.sign(message),
        }
    }
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_raw_base58() {
        let kp = IdentityKeypair::generate();
        let decoded = PublicKey::decode(&kp.public_key().to_base58()).unwrap();
        assert_eq!(decoded, kp.public_key());
    }

    #[test]
    fn test_decode_multibase() {
        let kp = IdentityKeypair::generate();
        let text = kp.public_key().to_multibase();
        assert!(text.starts_with('z'));
        assert_eq!(PublicKey::decode(&text).unwrap(), kp.public_key());
    }

    #[test]
    fn test_reject_invalid_alphabet() {
        // '0', 'O', 'I' and 'l' are not in the base58btc alphabet.
        assert!(matches!(
            PublicKey::decode("0OIl0OIl"),
            Err(KeyError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_reject_wrong_length() {
        let short = bs58::encode([1u8; 31]).into_string();
        assert!(matches!(
            PublicKey::decode(&short),
            Err(KeyError::InvalidLength { actual: 31, .. })
        ));

        let long = bs58::encode([1u8; 33]).into_string();
        assert!(PublicKey::decode(&long).is_err());
    }

    #[test]
    fn test_reject_foreign_multicodec() {
        // 0xec 0x01 is the x25519 multicodec: right length, wrong key type.
        let kp = IdentityKeypair::generate();
        let mut prefixed = vec![0xec, 0x01];
        prefixed.extend_from_slice(&kp.public_key().to_bytes());
        let text = format!("z{}", bs58::encode(prefixed).into_string());
        assert!(matches!(
            PublicKey::decode(&text),
            Err(KeyError::UnsupportedMulticodec)
        ));
    }

    #[test]
    fn test_reject_empty() {
        assert!(PublicKey::decode("").is_err());
        assert!(PublicKey::decode("   ").is_err());
    }

    #[test]
    fn test_sign_verify_strict() {
        let kp = IdentityKeypair::from_seed(&[9u8; 32]);
        let sig = kp.sign(b"nonce");
        assert!(kp.public_key().verify_strict(b"nonce", &sig));
        assert!(!kp.public_key().verify_strict(b"other", &sig));
    }

    #[test]
    fn test_signature_base64_decoding() {
        let kp = IdentityKeypair::generate();
        let sig = kp.sign(b"msg");
        let again = DetachedSignature::from_base64(&sig.to_base64()).unwrap();
        assert_eq!(again, sig);

        assert!(DetachedSignature::from_base64("not base64!!").is_err());
        // Valid base64, wrong length.
        assert!(DetachedSignature::from_base64(&STANDARD.encode([0u8; 63])).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = IdentityKeypair::from_seed(&[0xAB; 32]);
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&hex::encode([0xAB; 32])));
    }
}
