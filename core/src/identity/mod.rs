//! # Identity Module
//!
//! DIDs and what the service persists about them.
//!
//! 1. **DID** ([`did`]): grammar validation and parsing.
//! 2. **Records** ([`record`]): identities, contact digests, backup
//!    metadata and linked devices.
//! 3. **Service** ([`service`]): registration, contact linking, device
//!    binding and the "is this identifier already known" check.

pub mod did;
pub mod record;
pub mod service;

pub use did::{Did, DidError};
pub use record::{
    BackupRecord, ContactKind, ContactRecord, DeviceLinkRecord, DeviceStatus, IdentityRecord, SyncStatus,
};
pub use service::{DidRegistration, IdentityCheck, IdentityService};
