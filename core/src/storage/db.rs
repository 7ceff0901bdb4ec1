//! # IdentityDb: Persistent Identity Storage
//!
//! The persistence layer for identities, contacts, backup metadata and
//! linked devices, built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree            | Key                                 | Value                       |
//! |-----------------|-------------------------------------|-----------------------------|
//! | `identities`    | DID (UTF-8)                         | `bincode(IdentityRecord)`   |
//! | `contacts`      | identifier digest (hex, UTF-8)      | `bincode(ContactRecord)`    |
//! | `backups`       | DID `0x00` nanos (8B BE) id (8B BE) | `bincode(BackupRecord)`     |
//! | `backup_latest` | DID (UTF-8)                         | key of the latest backup    |
//! | `devices`       | device UUID (16B)                   | `bincode(DeviceLinkRecord)` |
//!
//! Backup timestamps are big-endian so a prefix scan over one DID returns
//! its backups oldest first. The trailing id comes from
//! [`sled::Db::generate_id`], so two backups stamped in the same
//! nanosecond still get distinct keys. `0x00` cannot occur in a valid DID,
//! so one DID's prefix never matches another's.
//!
//! ## Atomicity
//!
//! New identities and devices go in with `compare_and_swap(None, ..)`: of
//! two racing inserts for one key exactly one wins. Saving a backup reads
//! the `backup_latest` pointer, clears the flag on the record it names,
//! inserts the new record and moves the pointer, all in one transaction
//! over both trees. Concurrent saves for one DID therefore serialize.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use uuid::Uuid;

use crate::crypto::IdentifierDigest;
use crate::identity::record::{BackupRecord, ContactRecord, DeviceLinkRecord, IdentityRecord};
use crate::registry::{DidRegistry, IdentityRepository};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<TransactionError<DbError>> for DbError {
    fn from(err: TransactionError<DbError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => DbError::Sled(e),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn backup_prefix(did: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(did.len() + 1);
    key.extend_from_slice(did.as_bytes());
    key.push(0);
    key
}

fn backup_key(record: &BackupRecord, id: u64) -> Vec<u8> {
    let mut key = backup_prefix(&record.did);
    let nanos = record.created_at.timestamp_nanos_opt().unwrap_or_default();
    key.extend_from_slice(&(nanos as u64).to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn abort(err: DbError) -> ConflictableTransactionError<DbError> {
    ConflictableTransactionError::Abort(err)
}

// ---------------------------------------------------------------------------
// IdentityDb
// ---------------------------------------------------------------------------

/// sled-backed identity store.
///
/// Cheap to clone; every clone shares the same database handle, so it can
/// go straight into `Arc<dyn DidRegistry>` and `Arc<dyn IdentityRepository>`.
#[derive(Debug, Clone)]
pub struct IdentityDb {
    db: Db,
    identities: Tree,
    contacts: Tree,
    backups: Tree,
    backup_latest: Tree,
    devices: Tree,
}

impl IdentityDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A throwaway database removed on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let identities = db.open_tree("identities")?;
        let contacts = db.open_tree("contacts")?;
        let backups = db.open_tree("backups")?;
        let backup_latest = db.open_tree("backup_latest")?;
        let devices = db.open_tree("devices")?;
        Ok(Self {
            db,
            identities,
            contacts,
            backups,
            backup_latest,
            devices,
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }
}

#[async_trait]
impl DidRegistry for IdentityDb {
    async fn resolve(&self, did: &str) -> DbResult<Option<String>> {
        Ok(self.find_identity(did)?.map(|record| record.public_key))
    }
}

impl IdentityRepository for IdentityDb {
    fn find_identity(&self, did: &str) -> DbResult<Option<IdentityRecord>> {
        self.identities
            .get(did.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn save_identity(&self, record: &IdentityRecord) -> DbResult<()> {
        self.identities
            .insert(record.did.as_bytes(), encode(record)?)?;
        Ok(())
    }

    fn insert_identity(&self, record: &IdentityRecord) -> DbResult<bool> {
        let swapped = self.identities.compare_and_swap(
            record.did.as_bytes(),
            None as Option<&[u8]>,
            Some(encode(record)?),
        )?;
        Ok(swapped.is_ok())
    }

    fn delete_identity(&self, did: &str) -> DbResult<bool> {
        Ok(self.identities.remove(did.as_bytes())?.is_some())
    }

    fn find_contact(&self, digest: &IdentifierDigest) -> DbResult<Option<ContactRecord>> {
        self.contacts
            .get(digest.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn save_contact(&self, record: &ContactRecord) -> DbResult<()> {
        self.contacts
            .insert(record.identifier_hash.as_str().as_bytes(), encode(record)?)?;
        Ok(())
    }

    fn contacts_for(&self, did: &str) -> DbResult<Vec<ContactRecord>> {
        let mut out = Vec::new();
        for entry in self.contacts.iter() {
            let (_, bytes) = entry?;
            let contact: ContactRecord = decode(&bytes)?;
            if contact.did == did {
                out.push(contact);
            }
        }
        Ok(out)
    }

    fn save_backup(&self, record: &BackupRecord) -> DbResult<()> {
        let mut latest = record.clone();
        latest.is_latest = true;
        let key = backup_key(&latest, self.db.generate_id()?);
        let value = encode(&latest)?;
        let did = record.did.as_bytes();

        (&self.backups, &self.backup_latest)
            .transaction(|(backups, pointers)| {
                if let Some(previous_key) = pointers.get(did)? {
                    if let Some(bytes) = backups.get(&previous_key)? {
                        let mut previous: BackupRecord = decode(&bytes).map_err(abort)?;
                        previous.is_latest = false;
                        backups.insert(previous_key, encode(&previous).map_err(abort)?)?;
                    }
                }
                backups.insert(key.as_slice(), value.as_slice())?;
                pointers.insert(did, key.as_slice())?;
                Ok::<_, ConflictableTransactionError<DbError>>(())
            })
            .map_err(DbError::from)?;
        Ok(())
    }

    fn backups_for(&self, did: &str) -> DbResult<Vec<BackupRecord>> {
        self.backups
            .scan_prefix(backup_prefix(did))
            .map(|entry| {
                let (_, bytes) = entry?;
                decode(&bytes)
            })
            .collect()
    }

    fn latest_backup(&self, did: &str) -> DbResult<Option<BackupRecord>> {
        let Some(key) = self.backup_latest.get(did.as_bytes())? else {
            return Ok(None);
        };
        self.backups
            .get(key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn find_device(&self, device_id: &Uuid) -> DbResult<Option<DeviceLinkRecord>> {
        self.devices
            .get(device_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn insert_device(&self, record: &DeviceLinkRecord) -> DbResult<bool> {
        let swapped = self.devices.compare_and_swap(
            record.device_id.as_bytes(),
            None as Option<&[u8]>,
            Some(encode(record)?),
        )?;
        Ok(swapped.is_ok())
    }

    fn save_device(&self, record: &DeviceLinkRecord) -> DbResult<()> {
        self.devices
            .insert(&record.device_id.as_bytes()[..], encode(record)?)?;
        Ok(())
    }

    fn devices_for(&self, did: &str) -> DbResult<Vec<DeviceLinkRecord>> {
        let mut out = Vec::new();
        for entry in self.devices.iter() {
            let (_, bytes) = entry?;
            let device: DeviceLinkRecord = decode(&bytes)?;
            if device.did == did {
                out.push(device);
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
