//! Encrypted, portable identity backups.
//!
//! [`cipher`] is the pure crypto (PBKDF2 + AES-256-GCM, base64 blobs).
//! [`BackupService`] builds the export payload, records metadata and
//! upserts identities on restore.

pub mod cipher;
pub mod service;

pub use service::{BackupCreated, BackupPayload, BackupService, Restoration, Restored};
