//! Persistent identity records.
//!
//! Constructors stamp timestamps. Nothing updates them implicitly: call
//! [`IdentityRecord::touch`] (or set `last_verified`) before saving a change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::{BACKUP_STORAGE_PATH, BACKUP_VERSION};
use crate::crypto::IdentifierDigest;

// ---------------------------------------------------------------------------
// SyncStatus
// ---------------------------------------------------------------------------

/// Where an identity stands relative to the server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    LocalOnly,
    Synced,
    PendingSync,
    Restored,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::LocalOnly => "local_only",
            SyncStatus::Synced => "synced",
            SyncStatus::PendingSync => "pending_sync",
            SyncStatus::Restored => "restored",
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::LocalOnly
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// IdentityRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub did: String,
    /// Registered key text, base58btc or multibase.
    pub public_key: String,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_verified: Option<DateTime<Utc>>,
    pub local_version: u64,
    pub server_version: u64,
}

impl IdentityRecord {
    pub fn new(did: impl Into<String>, public_key: impl Into<String>, sync_status: SyncStatus) -> Self {
        let now = Utc::now();
        Self {
            did: did.into(),
            public_key: public_key.into(),
            sync_status,
            created_at: now,
            updated_at: now,
            last_verified: None,
            local_version: 1,
            server_version: 0,
        }
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a successful verification and touch.
    pub fn mark_verified(&mut self) {
        let now = Utc::now();
        self.last_verified = Some(now);
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// ContactRecord
// ---------------------------------------------------------------------------

/// How a contact identifier is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Phone,
}

impl ContactKind {
    /// `@` means email; anything else is treated as a phone number.
    pub fn infer(identifier: &str) -> Self {
        if identifier.contains('@') {
            ContactKind::Email
        } else {
            ContactKind::Phone
        }
    }
}

/// A contact identifier linked to a DID. Only the digest is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub identifier_hash: IdentifierDigest,
    pub did: String,
    pub kind: ContactKind,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactRecord {
    pub fn new(identifier_hash: IdentifierDigest, did: impl Into<String>, kind: ContactKind) -> Self {
        let now = Utc::now();
        Self {
            identifier_hash,
            did: did.into(),
            kind,
            verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// BackupRecord
// ---------------------------------------------------------------------------

/// Metadata for one exported backup. The blob itself is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub did: String,
    pub backup_version: String,
    pub file_hash: String,
    pub storage_path: String,
    pub is_latest: bool,
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    pub fn new(did: impl Into<String>, file_hash: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            backup_version: BACKUP_VERSION.to_string(),
            file_hash: file_hash.into(),
            storage_path: BACKUP_STORAGE_PATH.to_string(),
            is_latest: true,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceLinkRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
}

/// A client device bound to a DID for trust-token sign-in.
///
/// `device_info` is the JSON object the client sent, kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLinkRecord {
    pub device_id: Uuid,
    pub did: String,
    pub device_info: String,
    pub status: DeviceStatus,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceLinkRecord {
    pub fn new(device_id: Uuid, did: impl Into<String>, device_info: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            device_id,
            did: did.into(),
            device_info: device_info.into(),
            status: DeviceStatus::Active,
            last_login: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh sign-in from this device.
    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.last_login = now;
        self.updated_at = now;
    }
}
