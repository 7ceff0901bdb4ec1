//! Identity registration and contact lookup.
//!
//! Contacts are found by [`hash_identifier`] digest only. Registering a
//! DID with a `verified_identifier` atomically consumes the verified flag
//! from the OTP manager before anything is written, so one OTP
//! verification authorizes exactly one registration even under concurrent
//! requests. A registration that then fails gives the flag back.
//!
//! Devices are bound to a DID by the UUID in their `deviceInfo.deviceId`.
//! Binding the same device again only records a login; a device already
//! bound to a different DID is refused.
//!
//! `AlreadyExists` on a taken DID is a product decision: clients need to
//! know to switch to the restore flow. It does let a caller discover which
//! DIDs are registered.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{hash_identifier, PublicKey};
use crate::error::{TrustError, TrustResult};
use crate::identity::did::Did;
use crate::identity::record::{
    ContactKind, ContactRecord, DeviceLinkRecord, IdentityRecord, SyncStatus,
};
use crate::otp::OtpManager;
use crate::registry::IdentityRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCheck {
    pub exists: bool,
    pub did: Option<String>,
}

/// Input to [`IdentityService::register_did`].
#[derive(Debug, Clone, Default)]
pub struct DidRegistration {
    pub did: String,
    pub public_key: String,
    pub verified_identifier: Option<String>,
    pub offline_created: bool,
}

pub struct IdentityService {
    repository: Arc<dyn IdentityRepository>,
    otp: Arc<OtpManager>,
}

impl IdentityService {
    pub fn new(repository: Arc<dyn IdentityRepository>, otp: Arc<OtpManager>) -> Self {
        Self { repository, otp }
    }

    /// Is any DID linked to `identifier`?
    pub fn check_identity(&self, identifier: &str) -> TrustResult<IdentityCheck> {
        let digest = hash_identifier(identifier);
        let contact = self.repository.find_contact(&digest)?;
        tracing::debug!(id = ?digest, found = contact.is_some(), "identity check");
        Ok(match contact {
            Some(contact) => IdentityCheck {
                exists: true,
                did: Some(contact.did),
            },
            None => IdentityCheck {
                exists: false,
                did: None,
            },
        })
    }

    /// Register a new DID, optionally linking an OTP-verified identifier.
    pub async fn register_did(&self, registration: DidRegistration) -> TrustResult<IdentityRecord> {
        let DidRegistration {
            did,
            public_key,
            verified_identifier,
            offline_created,
        } = registration;

        let did = Did::parse(&did)?;
        PublicKey::decode(&public_key)?;

        let identifier = verified_identifier.filter(|id| !id.is_empty());
        if let Some(identifier) = identifier.as_deref() {
            if !self.otp.consume_verified(identifier).await? {
                return Err(TrustError::NotVerified);
            }
        }

        let status = if offline_created {
            SyncStatus::PendingSync
        } else {
            SyncStatus::Synced
        };
        let result = self.persist(&did, &public_key, status, identifier.as_deref());

        if let (Err(err), Some(identifier)) = (&result, identifier.as_deref()) {
            // Hand the flag back so the caller can retry without a new OTP.
            tracing::debug!(did = %did, error = %err, "registration failed, restoring verified flag");
            if let Err(restore) = self.otp.mark_verified(identifier).await {
                tracing::warn!(error = %restore, "could not restore verified flag");
            }
        }
        result
    }

    fn persist(
        &self,
        did: &Did,
        public_key: &str,
        status: SyncStatus,
        identifier: Option<&str>,
    ) -> TrustResult<IdentityRecord> {
        let mut record = IdentityRecord::new(did.as_str(), public_key, status);
        record.last_verified = Some(Utc::now());

        if !self.repository.insert_identity(&record)? {
            return Err(TrustError::AlreadyExists(did.to_string()));
        }

        if let Some(identifier) = identifier {
            if let Err(err) = self.link_contact(did.as_str(), identifier) {
                self.repository.delete_identity(did.as_str())?;
                return Err(err);
            }
        }
        tracing::info!(did = %did, method = did.method(), sync_status = %status, "DID registered");
        Ok(record)
    }

    /// Link `identifier` (by digest) to an existing DID.
    pub fn link_contact(&self, did: &str, identifier: &str) -> TrustResult<ContactRecord> {
        if self.repository.find_identity(did)?.is_none() {
            return Err(TrustError::NotFound(did.to_string()));
        }
        let contact = ContactRecord::new(hash_identifier(identifier), did, ContactKind::infer(identifier));
        self.repository.save_contact(&contact)?;
        tracing::info!(did, id = ?contact.identifier_hash, kind = ?contact.kind, "contact linked");
        Ok(contact)
    }

    /// Bind a client device to an existing DID for trust-token sign-in.
    ///
    /// `device_info` must be a JSON object whose `deviceId` is a UUID string.
    pub fn setup_trust_token(&self, did: &str, device_info: &Value) -> TrustResult<DeviceLinkRecord> {
        let did = Did::parse(did)?;
        if self.repository.find_identity(did.as_str())?.is_none() {
            return Err(TrustError::NotFound(did.to_string()));
        }
        let device_id = device_info
            .get("deviceId")
            .and_then(Value::as_str)
            .ok_or_else(|| TrustError::InvalidFormat("deviceInfo.deviceId required".into()))?;
        let device_id = Uuid::parse_str(device_id)
            .map_err(|e| TrustError::InvalidFormat(format!("deviceId: {e}")))?;

        let fresh = DeviceLinkRecord::new(device_id, did.as_str(), device_info.to_string());
        let existing = match self.repository.find_device(&device_id)? {
            Some(existing) => existing,
            None => {
                if self.repository.insert_device(&fresh)? {
                    tracing::info!(did = %did, %device_id, "device linked");
                    return Ok(fresh);
                }
                // Lost an insert race; the winner's record is there now.
                self.repository
                    .find_device(&device_id)?
                    .ok_or_else(|| TrustError::Store(format!("device {device_id} vanished")))?
            }
        };
        self.record_login(existing, &did)
    }

    fn record_login(&self, mut device: DeviceLinkRecord, did: &Did) -> TrustResult<DeviceLinkRecord> {
        if device.did != did.as_str() {
            return Err(TrustError::AlreadyExists(device.device_id.to_string()));
        }
        device.record_login();
        self.repository.save_device(&device)?;
        tracing::debug!(did = %did, device_id = %device.device_id, "device login recorded");
        Ok(device)
    }
}
