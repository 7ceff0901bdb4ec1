// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Anchor: Trust Establishment Core
//!
//! Anchor lets the holder of a decentralized identifier (DID) establish
//! trust with a backend. Three proofs, one crate:
//!
//! - **Contact control**: a one-time code sent to an email or phone
//!   ([`otp`]), rate limited per identifier.
//! - **Key control**: an Ed25519 signature over a server-issued nonce
//!   ([`proof`]), checked against the DID's registered key.
//! - **Portability**: passphrase-encrypted identity backups ([`backup`]).
//!
//! ## Architecture
//!
//! - **crypto**: hashing, AES-256-GCM, PBKDF2, Ed25519 keys and signatures.
//! - **identity**: DID validation, persistent records, registration and
//!   device binding.
//! - **otp** / **proof** / **backup**: the three trust services.
//! - **store**: the TTL'd ephemeral store all short-lived secrets live in.
//! - **registry** / **storage**: DID-to-key resolution and sled persistence.
//! - **notify**: OTP delivery seam.
//! - **config** / **error**: constants, runtime settings, error taxonomy.
//!
//! Collaborators (store, registry, notifier, repository) are traits handed
//! to each service as `Arc<dyn ..>` at construction. There is no global
//! state apart from the memoized [`crypto::init`] self-test.

pub mod backup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod notify;
pub mod otp;
pub mod proof;
pub mod registry;
pub mod storage;
pub mod store;

pub use error::{TrustError, TrustResult};
