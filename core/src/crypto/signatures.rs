//! # Detached Signatures
//!
//! Verification of proof-of-control signatures as they arrive from clients:
//! key text from the registry, signature text from the request.
//!
//! ## Strictness
//!
//! Verification uses `ed25519-dalek`'s `verify_strict`. Small-order public
//! keys and non-canonical `R` values are rejected even when the lenient
//! equation would accept them.
//!
//! ## Failure is just `false`
//!
//! Every decoding or verification problem collapses to `false`. A caller
//! learns whether the proof holds, never which part of it was broken.

use super::keys::{DetachedSignature, IdentityKeypair, PublicKey};

/// Verify a base64 signature over `message` against registered key text.
///
/// # Example
///
/// ```
/// use anchor_core::crypto::{sign_base64, verify_detached, IdentityKeypair};
///
/// let kp = IdentityKeypair::generate();
/// let sig = sign_base64(&kp, b"nonce");
/// assert!(verify_detached(&kp.public_key().to_base58(), b"nonce", &sig));
/// ```
pub fn verify_detached(public_key_text: &str, message: &[u8], signature_b64: &str) -> bool {
    let Ok(public_key) = PublicKey::decode(public_key_text) else {
        tracing::debug!("proof rejected: public key did not decode");
        return false;
    };
    let Ok(signature) = DetachedSignature::from_base64(signature_b64) else {
        tracing::debug!("proof rejected: signature did not decode");
        return false;
    };
    public_key.verify_strict(message, &signature)
}

/// Sign `message` and return standard base64, the wire form
/// [`verify_detached`] expects.
pub fn sign_base64(keypair: &IdentityKeypair, message: &[u8]) -> String {
    keypair.sign(message).to_base64()
}
