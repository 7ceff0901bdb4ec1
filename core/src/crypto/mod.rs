//! # Cryptographic Primitives for Anchor
//!
//! Every hash, every backup key and every proof-of-control check flows
//! through here:
//!
//! - **Ed25519** (strict verification) for proof-of-control signatures.
//! - **AES-256-GCM** for backup encryption.
//! - **PBKDF2-HMAC-SHA256** to turn passphrases into backup keys.
//! - **SHA-256** for identifier digests and content hashes.
//! - **HMAC-SHA256** for OTP code digests (see [`crate::otp`]).
//!
//! Everything here is a thin typed wrapper around RustCrypto and
//! `ed25519-dalek`. There is exactly one signature path and it is the real
//! one.
//!
//! ## Startup self-test
//!
//! [`init`] runs a known-answer check for SHA-256 plus AES-GCM and Ed25519
//! round trips, once per process. The node calls it before serving; a
//! failure there means the build is broken and the node refuses to start.

pub mod encryption;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod signatures;

use std::sync::OnceLock;

pub use encryption::{decrypt, encrypt, EncryptionError};
pub use hash::{content_hash, hash_identifier, sha256, sha256_hex, IdentifierDigest};
pub use keys::{DetachedSignature, IdentityKeypair, KeyError, PublicKey};
pub use signatures::{sign_base64, verify_detached};

static SELF_TEST: OnceLock<Result<(), String>> = OnceLock::new();

/// Run the crypto self-test once. Later calls return the cached outcome.
pub fn init() -> Result<(), String> {
    SELF_TEST.get_or_init(self_test).clone()
}

fn self_test() -> Result<(), String> {
    const SHA256_ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    if sha256_hex(b"abc") != SHA256_ABC {
        return Err("sha256 known-answer test failed".into());
    }

    let key = [0x5au8; 32];
    let sealed = encrypt(&key, b"anchor self-test").map_err(|e| e.to_string())?;
    let opened = decrypt(&key, &sealed).map_err(|e| e.to_string())?;
    if opened != b"anchor self-test" {
        return Err("aes-gcm round trip mismatch".into());
    }

    let kp = IdentityKeypair::from_seed(&[0x11u8; 32]);
    let sig = kp.sign(b"anchor self-test");
    if !kp.public_key().verify_strict(b"anchor self-test", &sig) {
        return Err("ed25519 round trip failed".into());
    }

    tracing::debug!("crypto self-test passed");
    Ok(())
}
