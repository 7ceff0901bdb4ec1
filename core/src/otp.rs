//! # OTP Manager
//!
//! One-time codes that prove control of a contact identifier (an email
//! address or phone number).
//!
//! ## Lifecycle
//!
//! ```text
//! Unrequested --generate--> Pending(ttl) --validate ok--> Consumed
//!                             |    ^                     (verified flag set
//!                             |    | generate             by the caller)
//!                             |    +------ (overwrites)
//!                             +--ttl--> Expired
//! generate over max_attempts in one window --> RateLimited
//! ```
//!
//! ## What is stored
//!
//! Never the code. `otp:<identifier>` holds
//! `hex(HMAC-SHA256(pepper, identifier || 0x00 || code))`. The pepper is
//! node configuration, so a dump of the store alone doesn't let anyone brute
//! force the 900 000 possible codes offline. The identifier is mixed in so
//! equal codes for different identifiers never share a digest.
//!
//! ## Rate limiting
//!
//! `otp_attempt:<identifier>` counts codes issued in the current window.
//! The check and the increment are one atomic store call
//! ([`EphemeralStore::increment_below`]), so concurrent requests can never
//! exceed `max_attempts`. Each successful increment restarts the window. A
//! successful validation clears the counter.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::config::{
    OtpConfig, ServiceConfig, ATTEMPT_PREFIX, OTP_CODE_MAX, OTP_CODE_MIN, OTP_PREFIX,
    VERIFIED_MARKER, VERIFIED_PREFIX, VERIFIED_TTL,
};
use crate::crypto::hash_identifier;
use crate::error::{TrustError, TrustResult};
use crate::notify::{Channel, Notifier};
use crate::store::{bounded, EphemeralStore};

type HmacSha256 = Hmac<Sha256>;

/// Opaque reference to an issued code: `otp:<identifier>`.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpHandle(String);

impl OtpHandle {
    fn for_identifier(identifier: &str) -> Self {
        Self(format!("{OTP_PREFIX}{identifier}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OtpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OtpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OtpHandle({})", self.0)
    }
}

/// Result of a successful [`OtpManager::generate`]. Never carries the code.
#[derive(Debug, Clone)]
pub struct OtpIssued {
    pub handle: OtpHandle,
    pub channel: Channel,
    pub expires_in: Duration,
}

pub struct OtpManager {
    store: Arc<dyn EphemeralStore>,
    notifier: Arc<dyn Notifier>,
    config: OtpConfig,
    limits: ServiceConfig,
}

impl OtpManager {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        notifier: Arc<dyn Notifier>,
        config: OtpConfig,
        limits: ServiceConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            limits,
        }
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue a fresh code for `identifier` and hand it to the notifier.
    ///
    /// An unsupported `channel` fails before any state is touched. A new
    /// code replaces any outstanding one.
    pub async fn generate(&self, identifier: &str, channel: &str) -> TrustResult<OtpIssued> {
        let channel: Channel = channel
            .parse()
            .map_err(|_| TrustError::InvalidChannel(channel.to_string()))?;
        let digest_id = hash_identifier(identifier);

        let attempt_key = format!("{ATTEMPT_PREFIX}{identifier}");
        let count = bounded(
            self.limits.store_timeout,
            self.store.increment_below(
                &attempt_key,
                u64::from(self.config.max_attempts),
                self.config.expiry(),
            ),
        )
        .await?;
        let Some(count) = count else {
            tracing::warn!(id = ?digest_id, "OTP rate limit reached");
            return Err(TrustError::RateLimited);
        };

        let code = rand::rngs::OsRng
            .gen_range(OTP_CODE_MIN..=OTP_CODE_MAX)
            .to_string();
        let digest = self.code_digest(identifier, &code)?;

        let handle = OtpHandle::for_identifier(identifier);
        bounded(
            self.limits.store_timeout,
            self.store
                .set_with_ttl(handle.as_str(), &digest, self.config.expiry()),
        )
        .await?;

        match tokio::time::timeout(
            self.limits.notifier_timeout,
            self.notifier.send(identifier, &code, channel),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(id = ?digest_id, %channel, error = %e, "OTP delivery failed"),
            Err(_) => tracing::warn!(id = ?digest_id, %channel, "OTP delivery timed out"),
        }

        tracing::info!(id = ?digest_id, %channel, attempt = count, "OTP issued");
        Ok(OtpIssued {
            handle,
            channel,
            expires_in: self.config.expiry(),
        })
    }

    /// Check `code` against the outstanding code for `identifier`.
    ///
    /// `Err(Expired)` if there is none. `Ok(false)` on mismatch, leaving the
    /// code in place. `Ok(true)` exactly once per issued code: the record is
    /// consumed with compare-and-delete, so a concurrent validator that
    /// loses the race also gets `Expired`.
    pub async fn validate(&self, identifier: &str, code: &str) -> TrustResult<bool> {
        let handle = OtpHandle::for_identifier(identifier);
        let stored = bounded(self.limits.store_timeout, self.store.get(handle.as_str()))
            .await?
            .ok_or(TrustError::Expired)?;

        let candidate = self.code_digest(identifier, code)?;
        let matches: bool = stored.as_bytes().ct_eq(candidate.as_bytes()).into();
        if !matches {
            tracing::info!(id = ?hash_identifier(identifier), "OTP mismatch");
            return Ok(false);
        }

        let consumed = bounded(
            self.limits.store_timeout,
            self.store.compare_and_delete(handle.as_str(), &stored),
        )
        .await?;
        if !consumed {
            return Err(TrustError::Expired);
        }

        let attempt_key = format!("{ATTEMPT_PREFIX}{identifier}");
        bounded(self.limits.store_timeout, self.store.delete(&attempt_key)).await?;

        tracing::info!(id = ?hash_identifier(identifier), "OTP validated");
        Ok(true)
    }

    /// Record that `identifier` passed validation, for [`VERIFIED_TTL`].
    pub async fn mark_verified(&self, identifier: &str) -> TrustResult<()> {
        bounded(
            self.limits.store_timeout,
            self.store
                .set_with_ttl(&verified_key(identifier), VERIFIED_MARKER, VERIFIED_TTL),
        )
        .await
    }

    pub async fn is_verified(&self, identifier: &str) -> TrustResult<bool> {
        let value = bounded(
            self.limits.store_timeout,
            self.store.get(&verified_key(identifier)),
        )
        .await?;
        Ok(value.as_deref() == Some(VERIFIED_MARKER))
    }

    /// Drop the verified flag unconditionally. Returns whether one was live.
    pub async fn invalidate_verified(&self, identifier: &str) -> TrustResult<bool> {
        bounded(
            self.limits.store_timeout,
            self.store.delete(&verified_key(identifier)),
        )
        .await
    }

    /// Atomically consume the verified flag. Of any number of concurrent
    /// callers after one [`OtpManager::mark_verified`], exactly one sees
    /// `true`.
    pub async fn consume_verified(&self, identifier: &str) -> TrustResult<bool> {
        bounded(
            self.limits.store_timeout,
            self.store
                .compare_and_delete(&verified_key(identifier), VERIFIED_MARKER),
        )
        .await
    }

    fn code_digest(&self, identifier: &str, code: &str) -> TrustResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.config.pepper)
            .map_err(|e| TrustError::InternalCryptoError(e.to_string()))?;
        mac.update(identifier.as_bytes());
        mac.update(&[0]);
        mac.update(code.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn verified_key(identifier: &str) -> String {
    format!("{VERIFIED_PREFIX}{identifier}")
}
