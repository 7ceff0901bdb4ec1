//! Collaborator traits for persistent identity state.
//!
//! [`DidRegistry`] is the one question the proof authenticator asks: what
//! public key is currently registered for this DID? [`IdentityRepository`]
//! is the wider persistence surface the identity and backup services use.
//! [`crate::storage::IdentityDb`] implements both on sled.

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::IdentifierDigest;
use crate::identity::record::{BackupRecord, ContactRecord, DeviceLinkRecord, IdentityRecord};
use crate::storage::db::DbResult;

/// Resolves a DID to its registered public key text.
#[async_trait]
pub trait DidRegistry: Send + Sync {
    /// `None` if the DID is not registered.
    async fn resolve(&self, did: &str) -> DbResult<Option<String>>;
}

/// Find/save access to identities, contacts, backup metadata and devices.
pub trait IdentityRepository: Send + Sync {
    fn find_identity(&self, did: &str) -> DbResult<Option<IdentityRecord>>;

    /// Insert or overwrite.
    fn save_identity(&self, record: &IdentityRecord) -> DbResult<()>;

    /// Insert only if no identity exists for `record.did`. Returns whether
    /// the insert happened. Atomic with respect to concurrent inserts.
    fn insert_identity(&self, record: &IdentityRecord) -> DbResult<bool>;

    fn delete_identity(&self, did: &str) -> DbResult<bool>;

    fn find_contact(&self, digest: &IdentifierDigest) -> DbResult<Option<ContactRecord>>;

    fn save_contact(&self, record: &ContactRecord) -> DbResult<()>;

    fn contacts_for(&self, did: &str) -> DbResult<Vec<ContactRecord>>;

    /// Save `record` as the latest backup of its DID, clearing `is_latest`
    /// on the previous one. Concurrent saves for one DID serialize: every
    /// record is kept and exactly one ends up latest.
    fn save_backup(&self, record: &BackupRecord) -> DbResult<()>;

    /// All backups of `did`, oldest first.
    fn backups_for(&self, did: &str) -> DbResult<Vec<BackupRecord>>;

    fn latest_backup(&self, did: &str) -> DbResult<Option<BackupRecord>>;

    fn find_device(&self, device_id: &Uuid) -> DbResult<Option<DeviceLinkRecord>>;

    /// Insert only if `record.device_id` is not linked yet. Returns whether
    /// the insert happened.
    fn insert_device(&self, record: &DeviceLinkRecord) -> DbResult<bool>;

    /// Insert or overwrite.
    fn save_device(&self, record: &DeviceLinkRecord) -> DbResult<()>;

    fn devices_for(&self, did: &str) -> DbResult<Vec<DeviceLinkRecord>>;
}
