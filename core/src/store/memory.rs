//! In-process [`EphemeralStore`] on a `DashMap`.
//!
//! Each key's shard lock is held for the whole of a read-modify-write, which
//! is what makes `increment_below` and `compare_and_delete` atomic. Expired
//! entries are treated as absent on every read and removed lazily; the node
//! also calls [`MemoryStore::purge_expired`] on a timer so idle keys don't
//! pile up.
//!
//! Deadlines use `tokio::time::Instant`, so paused-clock tests can move
//! straight past a TTL with `tokio::time::advance`.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{EphemeralStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time left on `key`, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.expires_at - now)
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(slot) if slot.get().is_live(now) => Ok(Some(slot.get().value.clone())),
            MapEntry::Occupied(slot) => {
                slot.remove();
                Ok(None)
            }
            MapEntry::Vacant(_) => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entries
            .insert(key.to_string(), Slot::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, slot)| slot.is_live(now))
            .unwrap_or(false))
    }

    async fn increment_below(&self, key: &str, limit: u64, ttl: Duration) -> StoreResult<Option<u64>> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut slot) => {
                let current = if slot.get().is_live(now) {
                    slot.get()
                        .value
                        .parse::<u64>()
                        .map_err(|_| StoreError::NotACounter { key: key.to_string() })?
                } else {
                    0
                };
                if current >= limit {
                    return Ok(None);
                }
                let next = current + 1;
                slot.insert(Slot::new(next.to_string(), ttl));
                Ok(Some(next))
            }
            MapEntry::Vacant(slot) => {
                if limit == 0 {
                    return Ok(None);
                }
                slot.insert(Slot::new("1".to_string(), ttl));
                Ok(Some(1))
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(slot) => {
                let live = slot.get().is_live(now);
                let matches = live && slot.get().value == expected;
                if matches || !live {
                    slot.remove();
                }
                Ok(matches)
            }
            MapEntry::Vacant(_) => Ok(false),
        }
    }
}
