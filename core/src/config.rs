//! # Service Configuration & Constants
//!
//! Every magic number in Anchor lives here. TTLs, lengths, iteration counts
//! and store key prefixes are part of the external contract with whatever
//! backs the ephemeral store, so changing one is a migration, not a tweak.
//!
//! Runtime-tunable values (OTP window, attempt budget, collaborator
//! timeouts) live in [`OtpConfig`] and [`ServiceConfig`]. The node fills
//! those from CLI flags and `ANCHOR_*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Ephemeral Store Keys
// ---------------------------------------------------------------------------

/// `otp:<identifier>` holds the keyed digest of the outstanding code.
pub const OTP_PREFIX: &str = "otp:";

/// `otp_attempt:<identifier>` holds the number of codes issued this window.
pub const ATTEMPT_PREFIX: &str = "otp_attempt:";

/// `verified:<identifier>` holds `"true"` after a successful validation.
pub const VERIFIED_PREFIX: &str = "verified:";

/// `challenge:<nonceId>` holds `"<did>:<nonce>"`.
pub const CHALLENGE_PREFIX: &str = "challenge:";

/// Value stored under a `verified:` key.
pub const VERIFIED_MARKER: &str = "true";

// ---------------------------------------------------------------------------
// OTP Parameters
// ---------------------------------------------------------------------------

/// Smallest code we issue. Codes are always six digits.
pub const OTP_CODE_MIN: u32 = 100_000;

/// Largest code we issue (inclusive).
pub const OTP_CODE_MAX: u32 = 999_999;

/// Default OTP lifetime. Also the attempt-counter window.
pub const DEFAULT_OTP_EXPIRY_SECONDS: u64 = 180;

/// Default number of codes an identifier may request per window.
pub const DEFAULT_OTP_MAX_ATTEMPTS: u32 = 3;

/// How long a successful validation authorizes a follow-up action.
/// Independent of, and longer than, the OTP lifetime.
pub const VERIFIED_TTL: Duration = Duration::from_secs(1800);

// ---------------------------------------------------------------------------
// Proof-of-Control Parameters
// ---------------------------------------------------------------------------

/// Challenge lifetime. Five minutes to sign a nonce is generous.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Raw nonce length before base64 encoding.
pub const CHALLENGE_NONCE_LENGTH: usize = 32;

/// Ed25519 public keys are 32 bytes. Anything else is not an Ed25519 key.
pub const ED25519_PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signatures are always 64 bytes.
pub const ED25519_SIGNATURE_LENGTH: usize = 64;

/// Multicodec varint prefix for an Ed25519 public key (`0xed` as varint).
pub const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

// ---------------------------------------------------------------------------
// Backup Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM key length in bytes. Backups use 96-bit IVs and 128-bit tags.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce (IV) length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// PBKDF2 salt length. Fresh on every encryption.
pub const KDF_SALT_LENGTH: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count. Fixed: changing it breaks every
/// existing backup, since the blob does not record it.
pub const KDF_ITERATIONS: u32 = 65_536;

/// Backup payload format version written into every export.
pub const BACKUP_VERSION: &str = "1.0";

/// Storage location recorded in backup metadata. The blob itself is
/// returned to the caller, not stored by the service.
pub const BACKUP_STORAGE_PATH: &str = "local";

/// Digest output length in bytes (SHA-256).
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Network Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Service version reported by the node.
pub const SERVICE_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// OTP issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Lifetime of an issued code and of the attempt-counter window.
    pub expiry_seconds: u64,
    /// Codes an identifier may request per window.
    pub max_attempts: u32,
    /// HMAC key for code digests. Every node sharing a store must share it.
    pub pepper: Vec<u8>,
}

impl OtpConfig {
    /// Lifetime of an issued code as a `Duration`.
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_seconds)
    }
}

impl Default for OtpConfig {
    /// Defaults with a random pepper. Fine for a single node and for tests;
    /// a fleet must configure a shared pepper.
    fn default() -> Self {
        use rand::RngCore;
        let mut pepper = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut pepper);
        Self {
            expiry_seconds: DEFAULT_OTP_EXPIRY_SECONDS,
            max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            pepper,
        }
    }
}

/// Bounds on calls to external collaborators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Upper bound on a single ephemeral-store call.
    pub store_timeout: Duration,
    /// Upper bound on a single notifier delivery.
    pub notifier_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            notifier_timeout: Duration::from_secs(5),
        }
    }
}
