//! Backup export and restore on top of the cipher and the repository.
//!
//! ## Default passphrase
//!
//! With no passphrase the DID itself is used. A DID is public, so such a
//! backup is only as private as the blob. This is a known weak default,
//! kept for compatibility with existing clients. Restore mirrors it: with
//! no passphrase the caller's `did_hint` is tried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::cipher;
use crate::config::BACKUP_VERSION;
use crate::error::{TrustError, TrustResult};
use crate::crypto::PublicKey;
use crate::identity::did::Did;
use crate::identity::record::{BackupRecord, IdentityRecord, SyncStatus};
use crate::registry::IdentityRepository;

/// Plaintext inside every backup blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    pub did: String,
    pub public_key: String,
    pub version: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct BackupCreated {
    pub encrypted_file: String,
    pub file_hash: String,
    pub created_at: DateTime<Utc>,
}

/// What a restore did to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restoration {
    /// The DID was unknown and was inserted with status `restored`.
    Inserted,
    /// The DID already existed; only `last_verified` moved.
    Refreshed,
}

#[derive(Debug, Clone)]
pub struct Restored {
    pub did: String,
    pub restoration: Restoration,
}

pub struct BackupService {
    repository: Arc<dyn IdentityRepository>,
}

impl BackupService {
    pub fn new(repository: Arc<dyn IdentityRepository>) -> Self {
        Self { repository }
    }

    /// Export `did` as an encrypted blob and record it as the latest backup.
    pub async fn create_backup(&self, did: &str, passphrase: Option<&str>) -> TrustResult<BackupCreated> {
        Did::parse(did)?;
        let identity = self
            .repository
            .find_identity(did)?
            .ok_or_else(|| TrustError::NotFound(did.to_string()))?;

        let payload = BackupPayload {
            did: identity.did.clone(),
            public_key: identity.public_key.clone(),
            version: BACKUP_VERSION.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let plaintext = serde_json::to_vec(&payload)
            .map_err(|e| TrustError::InternalCryptoError(e.to_string()))?;
        let passphrase = passphrase
            .filter(|p| !p.is_empty())
            .unwrap_or(did)
            .to_string();

        let encrypted_file = tokio::task::spawn_blocking(move || cipher::encrypt(&plaintext, &passphrase))
            .await
            .map_err(|e| TrustError::InternalCryptoError(e.to_string()))??;
        let file_hash = cipher::content_hash(&encrypted_file);

        let record = BackupRecord::new(did, file_hash.clone());
        self.repository.save_backup(&record)?;

        tracing::info!(did, file_hash = %file_hash, "backup created");
        Ok(BackupCreated {
            encrypted_file,
            file_hash,
            created_at: record.created_at,
        })
    }

    /// Decrypt a blob and upsert the identity it carries.
    pub async fn restore_identity(
        &self,
        encrypted_file: &str,
        passphrase: Option<&str>,
        did_hint: Option<&str>,
    ) -> TrustResult<Restored> {
        let passphrase = passphrase
            .filter(|p| !p.is_empty())
            .or(did_hint.filter(|d| !d.is_empty()))
            .ok_or_else(|| TrustError::InvalidFormat("passphrase or DID required".into()))?
            .to_string();

        let blob = encrypted_file.to_string();
        let plaintext = tokio::task::spawn_blocking(move || cipher::decrypt(&blob, &passphrase))
            .await
            .map_err(|e| TrustError::InternalCryptoError(e.to_string()))??;

        let payload: BackupPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| TrustError::InvalidFormat(format!("backup payload: {e}")))?;
        Did::parse(&payload.did)?;
        // A blob is attacker-supplied; never persist a key proofs cannot use.
        PublicKey::decode(&payload.public_key)?;

        let restoration = match self.repository.find_identity(&payload.did)? {
            Some(mut existing) => {
                existing.mark_verified();
                self.repository.save_identity(&existing)?;
                Restoration::Refreshed
            }
            None => {
                let mut record = IdentityRecord::new(&payload.did, &payload.public_key, SyncStatus::Restored);
                record.last_verified = Some(record.created_at);
                if !self.repository.insert_identity(&record)? {
                    // Registered in the meantime; treat it like an existing identity.
                    if let Some(mut existing) = self.repository.find_identity(&payload.did)? {
                        existing.mark_verified();
                        self.repository.save_identity(&existing)?;
                    }
                    Restoration::Refreshed
                } else {
                    Restoration::Inserted
                }
            }
        };

        tracing::info!(did = %payload.did, ?restoration, "identity restored");
        Ok(Restored {
            did: payload.did,
            restoration,
        })
    }
}
