//! # Ephemeral Store
//!
//! Short-lived shared state: OTP digests, attempt counters, verified flags
//! and challenges. Every entry carries a TTL and simply disappears when it
//! runs out. TTL expiry is the only timeout an issued secret has.
//!
//! The trait exposes two atomic check-then-act primitives,
//! [`EphemeralStore::increment_below`] and
//! [`EphemeralStore::compare_and_delete`]. The rate limiter and single-use
//! consumption of codes and challenges are built on them, so two racing
//! requests can never both slip under a limit or both consume one secret.
//! A networked backend must implement them atomically (a Lua script or
//! `WATCH`/`MULTI` on Redis, for example).

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::error::{TrustError, TrustResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("value at {key} is not a counter")]
    NotACounter { key: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value store with per-entry TTL.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Live value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set `key` to `value` for `ttl`, overwriting any previous entry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Atomically increment the counter at `key` if it is below `limit`.
    ///
    /// An absent or expired counter counts as zero. On success the counter's
    /// TTL is reset to `ttl` and the new count is returned. At or above the
    /// limit nothing changes (value and TTL alike) and `None` is returned.
    async fn increment_below(&self, key: &str, limit: u64, ttl: Duration) -> StoreResult<Option<u64>>;

    /// Atomically remove `key` only if its live value equals `expected`.
    ///
    /// Of any number of concurrent callers with the same `expected`, at most
    /// one sees `true`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;
}

/// Run one store call under `limit`. Elapsed becomes [`TrustError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> TrustResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| TrustError::Timeout("ephemeral store"))?
        .map_err(TrustError::from)
}
