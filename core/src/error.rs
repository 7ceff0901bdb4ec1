//! Error taxonomy for the trust-establishment services.
//!
//! Every public service operation returns a [`TrustError`] on failure.
//! Module-level errors (encryption, keys, DIDs, store, database) convert
//! into it at the service boundary, so raw crypto or storage faults never
//! reach a caller and are never mistaken for success.

use thiserror::Error;

use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::KeyError;
use crate::identity::did::DidError;
use crate::storage::db::DbError;
use crate::store::StoreError;

/// Errors surfaced by the OTP, proof-of-control, backup and identity services.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Too many codes requested for this identifier in the current window.
    #[error("rate limited: retry after the current window")]
    RateLimited,

    /// The referenced DID (or other record) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The OTP or challenge is absent or past its TTL.
    #[error("expired or not found")]
    Expired,

    /// Input failed a format check (DID grammar, key text, blob framing).
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The stored challenge is bound to a different DID.
    #[error("invalid challenge")]
    InvalidChallenge,

    /// Signature or decryption failure. Deliberately carries no detail.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// An unexpected fault inside a crypto primitive.
    #[error("internal crypto error: {0}")]
    InternalCryptoError(String),

    /// The requested delivery channel is not supported.
    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    /// The DID is already registered.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The identifier has no live verified flag.
    #[error("identifier not verified")]
    NotVerified,

    /// A collaborator call exceeded its configured bound.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The ephemeral store or repository failed.
    #[error("store error: {0}")]
    Store(String),
}

impl TrustError {
    /// The message safe to show an end user.
    ///
    /// Collapses the specific failure into a handful of generic texts so a
    /// caller can't tell a wrong code from a missing record, or a bad key
    /// from a bad signature.
    pub fn public_message(&self) -> &'static str {
        match self {
            TrustError::RateLimited => "too many requests, please try again later",
            TrustError::Expired | TrustError::InvalidChallenge => "invalid or expired",
            TrustError::AuthenticationFailure => "verification failed",
            TrustError::NotVerified => "identifier not verified, complete OTP verification first",
            TrustError::InvalidChannel(_) => "unsupported channel",
            TrustError::InvalidFormat(_) => "invalid input",
            TrustError::NotFound(_) => "not found",
            TrustError::AlreadyExists(_) => "already exists",
            TrustError::InternalCryptoError(_)
            | TrustError::Timeout(_)
            | TrustError::Store(_) => "internal error",
        }
    }
}

impl From<EncryptionError> for TrustError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::DecryptFailed => TrustError::AuthenticationFailure,
            EncryptionError::InvalidEncoding | EncryptionError::BlobTooShort => {
                TrustError::InvalidFormat(err.to_string())
            }
            EncryptionError::EncryptFailed => TrustError::InternalCryptoError(err.to_string()),
        }
    }
}

impl From<KeyError> for TrustError {
    fn from(err: KeyError) -> Self {
        TrustError::InvalidFormat(err.to_string())
    }
}

impl From<DidError> for TrustError {
    fn from(err: DidError) -> Self {
        TrustError::InvalidFormat(err.to_string())
    }
}

impl From<StoreError> for TrustError {
    fn from(err: StoreError) -> Self {
        TrustError::Store(err.to_string())
    }
}

impl From<DbError> for TrustError {
    fn from(err: DbError) -> Self {
        TrustError::Store(err.to_string())
    }
}

/// Shorthand used by every service.
pub type TrustResult<T> = Result<T, TrustError>;
